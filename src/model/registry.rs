use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::core::{DbError, Result};
use crate::model::entity::TypeDesc;
use crate::model::instance::Persistent;

lazy_static! {
    static ref REGISTRY: RwLock<RegistryInner> = RwLock::new(RegistryInner::default());
}

#[derive(Default)]
struct RegistryInner {
    by_type: HashMap<TypeId, Arc<TypeDesc>>,
    by_id: HashMap<u32, TypeId>,
    by_name: HashMap<String, TypeId>,
}

/// Process-wide insert-once cache of entity descriptions.
///
/// Lookups after warm-up take the read lock only; a description is never
/// mutated after publication. Registration failures cache nothing.
pub struct Registry;

impl Registry {
    /// Resolve (building on first use) the description for `T`.
    pub fn describe<T: Persistent>() -> Result<Arc<TypeDesc>> {
        let type_id = TypeId::of::<T>();

        if let Some(desc) = REGISTRY.read()?.by_type.get(&type_id) {
            return Ok(Arc::clone(desc));
        }

        // Build and validate outside the write lock; only publication is
        // serialized.
        let desc = Arc::new(T::describe().finish()?);

        let mut inner = REGISTRY.write()?;
        if let Some(existing) = inner.by_type.get(&type_id) {
            return Ok(Arc::clone(existing));
        }

        if let Some(other) = inner.by_id.get(&desc.id) {
            if *other != type_id {
                return Err(DbError::Structural(format!(
                    "entity id {} of {} is already registered by another type",
                    desc.id, desc.name
                )));
            }
        }
        let name_key = desc.name.to_ascii_lowercase();
        if let Some(other) = inner.by_name.get(&name_key) {
            if *other != type_id {
                return Err(DbError::Structural(format!(
                    "entity name {} is already registered by another type",
                    desc.name
                )));
            }
        }

        inner.by_id.insert(desc.id, type_id);
        inner.by_name.insert(name_key, type_id);
        inner.by_type.insert(type_id, Arc::clone(&desc));
        drop(inner);

        T::after_register(&desc);
        Ok(desc)
    }

    pub fn lookup_by_id(id: u32) -> Option<Arc<TypeDesc>> {
        let inner = REGISTRY.read().ok()?;
        let type_id = inner.by_id.get(&id)?;
        inner.by_type.get(type_id).cloned()
    }

    pub fn lookup_by_name(name: &str) -> Option<Arc<TypeDesc>> {
        let inner = REGISTRY.read().ok()?;
        let type_id = inner.by_name.get(&name.to_ascii_lowercase())?;
        inner.by_type.get(type_id).cloned()
    }
}
