use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::changelog::ChangeLog;
use crate::config::DbConfig;
use crate::connection::Connection;
use crate::core::{DbError, Result, Value};
use crate::dialect::{NameCasing, Translator};
use crate::schema::SchemaEngine;

#[derive(Clone, Default)]
struct Credentials {
    user: String,
    password: String,
}

/// Payload handed to the observable trace events.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub command_text: String,
    pub timestamp: DateTime<Utc>,
    pub elapsed: Duration,
    pub parameters: Option<Vec<(String, Value)>>,
}

type TraceHandler = Box<dyn Fn(&TraceEvent) + Send + Sync>;
type LogFactory = Arc<dyn Fn() -> Box<dyn ChangeLog> + Send + Sync>;

#[derive(Default)]
struct TraceHandlers {
    before_execute: Vec<TraceHandler>,
    after_execute: Vec<TraceHandler>,
    after_save: Vec<TraceHandler>,
    after_delete: Vec<TraceHandler>,
}

/// One configured database: dialect translator, credentials, trace
/// events, and the connection factory. Shared behind an `Arc` so loaded
/// entities can hold a handle for delayed-field fetches.
pub struct Database {
    config: DbConfig,
    translator: Translator,
    credentials: Mutex<Credentials>,
    admin_credentials: Mutex<Credentials>,
    silent: AtomicBool,
    handlers: Mutex<TraceHandlers>,
    log_factory: Mutex<Option<LogFactory>>,
}

impl Database {
    pub fn new(config: DbConfig) -> Result<Arc<Self>> {
        config.validate().map_err(DbError::Connection)?;
        let mut translator = Translator::new(config.dialect);
        for (name, replacement) in &config.snippets {
            translator.add_snippet(name.clone(), replacement.clone());
        }
        Ok(Arc::new(Self {
            config,
            translator,
            credentials: Mutex::new(Credentials::default()),
            admin_credentials: Mutex::new(Credentials::default()),
            silent: AtomicBool::new(false),
            handlers: Mutex::new(TraceHandlers::default()),
            log_factory: Mutex::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        &self.config.database_name
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn name_casing(&self) -> NameCasing {
        self.config.dialect.name_casing()
    }

    pub fn translate_name(&self, name: &str) -> String {
        self.translator.translate_name(name)
    }

    /// Normalize portable tokens in a raw SQL fragment.
    pub fn translate_constant(&self, fragment: &str) -> String {
        self.translator.rewrite(fragment)
    }

    pub fn set_credentials(&self, user: &str, password: &str) {
        if let Ok(mut credentials) = self.credentials.lock() {
            credentials.user = user.to_string();
            credentials.password = password.to_string();
        }
    }

    pub fn set_admin_credentials(&self, user: &str, password: &str) {
        if let Ok(mut credentials) = self.admin_credentials.lock() {
            credentials.user = user.to_string();
            credentials.password = password.to_string();
        }
    }

    fn effective_admin(&self) -> Credentials {
        let admin = self.admin_credentials.lock().map(|c| c.clone()).unwrap_or_default();
        if admin.user.is_empty() {
            self.credentials.lock().map(|c| c.clone()).unwrap_or_default()
        } else {
            admin
        }
    }

    /// When set, neither trace events nor entity change events fire.
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::Relaxed);
    }

    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    pub fn set_log_factory(&self, factory: LogFactory) {
        if let Ok(mut slot) = self.log_factory.lock() {
            *slot = Some(factory);
        }
    }

    pub(crate) fn make_change_log(&self) -> Option<Box<dyn ChangeLog>> {
        self.log_factory
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|factory| factory()))
    }

    /// Open a scoped connection; the driver handle is released when the
    /// returned value drops.
    pub fn open_connection(self: &Arc<Self>) -> Result<Connection> {
        let credentials = self.credentials.lock().map(|c| c.clone()).unwrap_or_default();
        let handle = self.config.driver.connect(
            &self.config.connection_string,
            &credentials.user,
            &credentials.password,
        )?;
        debug!(database = %self.config.database_name, "connection opened");
        Ok(Connection::new(Arc::clone(self), handle, self.make_change_log()))
    }

    pub fn exists(&self) -> Result<bool> {
        let admin = self.effective_admin();
        self.config
            .driver
            .database_exists(&self.config.connection_string, &admin.user, &admin.password)
    }

    pub fn create(&self) -> Result<()> {
        let admin = self.effective_admin();
        self.config
            .driver
            .create_database(&self.config.connection_string, &admin.user, &admin.password)
    }

    /// Run the schema engine over every registered base table and view
    /// type, in registration order.
    pub fn check(self: &Arc<Self>, force: bool, feedback: Option<&dyn Fn(&str)>) -> Result<()> {
        let engine = SchemaEngine::new(Arc::clone(self));
        for entity in self
            .config
            .base_table_types
            .iter()
            .chain(self.config.base_view_types.iter())
        {
            let desc = entity.describe()?;
            if let Some(feedback) = feedback {
                feedback(&desc.name);
            }
            engine.check_desc(&desc, force)?;
        }
        Ok(())
    }

    pub fn on_before_execute(&self, handler: TraceHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.before_execute.push(handler);
        }
    }

    pub fn on_after_execute(&self, handler: TraceHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.after_execute.push(handler);
        }
    }

    pub fn on_after_save(&self, handler: TraceHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.after_save.push(handler);
        }
    }

    pub fn on_after_delete(&self, handler: TraceHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.after_delete.push(handler);
        }
    }

    fn emit(&self, select: impl Fn(&TraceHandlers) -> &[TraceHandler], event: &TraceEvent) {
        if self.is_silent() {
            return;
        }
        if let Ok(handlers) = self.handlers.lock() {
            for handler in select(&handlers) {
                handler(event);
            }
        }
    }

    pub(crate) fn trace_before(&self, sql: &str, params: &[(String, Value)]) {
        let event = TraceEvent {
            command_text: sql.to_string(),
            timestamp: Utc::now(),
            elapsed: Duration::ZERO,
            parameters: Some(params.to_vec()),
        };
        self.emit(|h| h.before_execute.as_slice(), &event);
    }

    pub(crate) fn trace_after(&self, sql: &str, params: &[(String, Value)], elapsed: Duration) {
        let event = TraceEvent {
            command_text: sql.to_string(),
            timestamp: Utc::now(),
            elapsed,
            parameters: Some(params.to_vec()),
        };
        self.emit(|h| h.after_execute.as_slice(), &event);
    }

    pub(crate) fn emit_after_save(&self, sql: &str, elapsed: Duration) {
        let event = TraceEvent {
            command_text: sql.to_string(),
            timestamp: Utc::now(),
            elapsed,
            parameters: None,
        };
        self.emit(|h| h.after_save.as_slice(), &event);
    }

    pub(crate) fn emit_after_delete(&self, sql: &str, elapsed: Duration) {
        let event = TraceEvent {
            command_text: sql.to_string(),
            timestamp: Utc::now(),
            elapsed,
            parameters: None,
        };
        self.emit(|h| h.after_delete.as_slice(), &event);
    }
}
