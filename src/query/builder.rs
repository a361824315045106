use std::sync::Arc;

use crate::core::{DbError, Result, Value};
use crate::dialect::Translator;
use crate::model::{Persistent, TypeDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Undefined,
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    Left,
    Right,
    Inner,
    Full,
}

impl JoinMode {
    fn sql(self) -> &'static str {
        match self {
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Inner => "INNER JOIN",
            Self::Full => "FULL JOIN",
        }
    }
}

/// Join condition: a field pair between the two sides, or a raw
/// expression emitted verbatim.
#[derive(Debug, Clone)]
pub enum JoinOn {
    Fields(String, String),
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connector {
    None,
    And,
    Or,
    AndNot,
    OrNot,
}

impl Connector {
    fn sql(self) -> &'static str {
        match self {
            Self::None => "",
            Self::And => " AND ",
            Self::Or => " OR ",
            Self::AndNot => " AND NOT ",
            Self::OrNot => " OR NOT ",
        }
    }
}

#[derive(Debug, Clone)]
enum Element {
    Where {
        connector: Connector,
        field: String,
        op: String,
    },
    Group {
        connector: Connector,
        elements: Vec<Element>,
    },
    Sort {
        field: String,
        descending: bool,
    },
    GroupOn {
        field: String,
    },
}

#[derive(Debug, Clone)]
struct Join {
    mode: JoinMode,
    alias: String,
    target: Arc<TypeDesc>,
    on: JoinOn,
}

/// Fluent query construction for one entity type. One builder instance
/// accumulates exactly one statement; the first of
/// `select`/`insert`/`update`/`delete` fixes the kind and re-entry fails.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    desc: Arc<TypeDesc>,
    alias: Option<String>,
    query_type: QueryType,
    fields: Vec<String>,
    top: Option<u64>,
    values: Vec<Value>,
    joins: Vec<Join>,
    elements: Vec<Element>,
}

impl QueryBuilder {
    pub fn new(desc: Arc<TypeDesc>, alias: Option<&str>) -> Self {
        Self {
            desc,
            alias: alias.map(str::to_string),
            query_type: QueryType::Undefined,
            fields: Vec::new(),
            top: None,
            values: Vec::new(),
            joins: Vec::new(),
            elements: Vec::new(),
        }
    }

    pub fn for_entity<T: Persistent>(alias: Option<&str>) -> Result<Self> {
        Ok(Self::new(T::type_desc()?, alias))
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    pub fn captured_values(&self) -> &[Value] {
        &self.values
    }

    fn assign_type(&mut self, next: QueryType) -> Result<()> {
        if self.query_type != QueryType::Undefined {
            return Err(DbError::Query(format!(
                "query is already {:?}; cannot re-enter as {:?}",
                self.query_type, next
            )));
        }
        if self.desc.is_view() && next != QueryType::Select {
            return Err(DbError::Query(format!(
                "{} is a view; only SELECT is allowed",
                self.desc.name
            )));
        }
        self.query_type = next;
        Ok(())
    }

    /// Begin a SELECT; an empty field list selects every declared field.
    pub fn select(&mut self, fields: &[&str]) -> Result<&mut Self> {
        self.assign_type(QueryType::Select)?;
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        Ok(self)
    }

    pub fn insert(&mut self) -> Result<&mut Self> {
        self.assign_type(QueryType::Insert)?;
        Ok(self)
    }

    pub fn update(&mut self) -> Result<&mut Self> {
        self.assign_type(QueryType::Update)?;
        Ok(self)
    }

    pub fn delete(&mut self) -> Result<&mut Self> {
        self.assign_type(QueryType::Delete)?;
        Ok(self)
    }

    /// Record cap; SELECT only, set once.
    pub fn top(&mut self, count: u64) -> Result<&mut Self> {
        if self.query_type != QueryType::Select {
            return Err(DbError::Query("top is only valid on a SELECT query".into()));
        }
        if self.top.is_some() {
            return Err(DbError::Query("top was already set".into()));
        }
        self.top = Some(count);
        Ok(self)
    }

    /// Add a written field/value pair (INSERT and UPDATE).
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        match self.query_type {
            QueryType::Insert | QueryType::Update => {
                self.fields.push(field.to_string());
                self.values.push(value.into());
                Ok(self)
            }
            other => Err(DbError::Query(format!(
                "set is not valid on a {:?} query",
                other
            ))),
        }
    }

    fn push_where(&mut self, connector: Connector, field: &str, op: &str, value: Value) -> Result<()> {
        let has_conditions = self
            .elements
            .iter()
            .any(|e| matches!(e, Element::Where { .. } | Element::Group { .. }));
        match connector {
            Connector::None if has_conditions => {
                return Err(DbError::Query(
                    "a further WHERE must use an and/or connector".into(),
                ));
            }
            Connector::None => {}
            _ if !has_conditions => {
                return Err(DbError::Query(
                    "a connector WHERE requires a preceding condition".into(),
                ));
            }
            _ => {}
        }
        self.elements.push(Element::Where {
            connector,
            field: field.to_string(),
            op: op.to_string(),
        });
        self.values.push(value);
        Ok(())
    }

    pub fn where_eq(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.push_where(Connector::None, field, "=", value.into())?;
        Ok(self)
    }

    pub fn where_cmp(&mut self, field: &str, op: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.push_where(Connector::None, field, op, value.into())?;
        Ok(self)
    }

    pub fn and_eq(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.push_where(Connector::And, field, "=", value.into())?;
        Ok(self)
    }

    pub fn and_cmp(&mut self, field: &str, op: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.push_where(Connector::And, field, op, value.into())?;
        Ok(self)
    }

    pub fn or_eq(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.push_where(Connector::Or, field, "=", value.into())?;
        Ok(self)
    }

    pub fn or_cmp(&mut self, field: &str, op: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.push_where(Connector::Or, field, op, value.into())?;
        Ok(self)
    }

    pub fn and_not_cmp(&mut self, field: &str, op: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.push_where(Connector::AndNot, field, op, value.into())?;
        Ok(self)
    }

    pub fn or_not_cmp(&mut self, field: &str, op: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.push_where(Connector::OrNot, field, op, value.into())?;
        Ok(self)
    }

    fn push_group<F>(&mut self, connector: Connector, build: F) -> Result<()>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let has_conditions = self
            .elements
            .iter()
            .any(|e| matches!(e, Element::Where { .. } | Element::Group { .. }));
        if connector == Connector::None && has_conditions {
            return Err(DbError::Query(
                "a further WHERE group must use an and/or connector".into(),
            ));
        }
        if connector != Connector::None && !has_conditions {
            return Err(DbError::Query(
                "a connector group requires a preceding condition".into(),
            ));
        }

        let mut inner = QueryBuilder::new(Arc::clone(&self.desc), self.alias.as_deref());
        inner.query_type = QueryType::Select;
        build(&mut inner)?;
        if inner.elements.is_empty() {
            return Err(DbError::Query("empty WHERE group".into()));
        }
        self.elements.push(Element::Group {
            connector,
            elements: inner.elements,
        });
        self.values.extend(inner.values);
        Ok(())
    }

    /// Open a nested, parenthesized WHERE group.
    pub fn where_group<F>(&mut self, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        self.push_group(Connector::None, build)?;
        Ok(self)
    }

    pub fn and_group<F>(&mut self, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        self.push_group(Connector::And, build)?;
        Ok(self)
    }

    pub fn or_group<F>(&mut self, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        self.push_group(Connector::Or, build)?;
        Ok(self)
    }

    pub fn and_not_group<F>(&mut self, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        self.push_group(Connector::AndNot, build)?;
        Ok(self)
    }

    pub fn or_not_group<F>(&mut self, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        self.push_group(Connector::OrNot, build)?;
        Ok(self)
    }

    fn push_sort(&mut self, field: &str, descending: bool, chained: bool) -> Result<()> {
        let has_sort = self.elements.iter().any(|e| matches!(e, Element::Sort { .. }));
        if chained && !has_sort {
            return Err(DbError::Query("then_by requires a preceding order_by".into()));
        }
        if !chained && has_sort {
            return Err(DbError::Query("order_by was already issued; use then_by".into()));
        }
        self.elements.push(Element::Sort {
            field: field.to_string(),
            descending,
        });
        Ok(())
    }

    pub fn order_by(&mut self, field: &str) -> Result<&mut Self> {
        self.push_sort(field, false, false)?;
        Ok(self)
    }

    pub fn order_desc_by(&mut self, field: &str) -> Result<&mut Self> {
        self.push_sort(field, true, false)?;
        Ok(self)
    }

    pub fn then_by(&mut self, field: &str) -> Result<&mut Self> {
        self.push_sort(field, false, true)?;
        Ok(self)
    }

    pub fn then_desc_by(&mut self, field: &str) -> Result<&mut Self> {
        self.push_sort(field, true, true)?;
        Ok(self)
    }

    pub fn group_by(&mut self, field: &str) -> Result<&mut Self> {
        let has_group = self.elements.iter().any(|e| matches!(e, Element::GroupOn { .. }));
        if has_group {
            return Err(DbError::Query("group_by was already issued; use then_group_by".into()));
        }
        self.elements.push(Element::GroupOn {
            field: field.to_string(),
        });
        Ok(self)
    }

    pub fn then_group_by(&mut self, field: &str) -> Result<&mut Self> {
        let has_group = self.elements.iter().any(|e| matches!(e, Element::GroupOn { .. }));
        if !has_group {
            return Err(DbError::Query("then_group_by requires a preceding group_by".into()));
        }
        self.elements.push(Element::GroupOn {
            field: field.to_string(),
        });
        Ok(self)
    }

    pub fn join<T: Persistent>(&mut self, mode: JoinMode, alias: &str, on: JoinOn) -> Result<&mut Self> {
        if self.joins.iter().any(|j| j.alias.eq_ignore_ascii_case(alias))
            || self
                .alias
                .as_deref()
                .map_or(false, |a| a.eq_ignore_ascii_case(alias))
        {
            return Err(DbError::Query(format!("duplicate alias {}", alias)));
        }
        self.joins.push(Join {
            mode,
            alias: alias.to_string(),
            target: T::type_desc()?,
            on,
        });
        Ok(self)
    }

    /// Prefix an unqualified field with the active alias; dotted
    /// references pass through untouched.
    fn qualify(&self, field: &str) -> String {
        if field.contains('.') {
            return field.to_string();
        }
        match &self.alias {
            Some(alias) => format!("{}.{}", alias, field),
            None => field.to_string(),
        }
    }

    fn emit_conditions(elements: &[Element], alias: Option<&str>, out: &mut String) {
        for element in elements {
            match element {
                Element::Where { connector, field, op } => {
                    out.push_str(connector.sql());
                    let qualified = if field.contains('.') {
                        field.clone()
                    } else if let Some(alias) = alias {
                        format!("{}.{}", alias, field)
                    } else {
                        field.clone()
                    };
                    out.push_str(&qualified);
                    out.push(' ');
                    out.push_str(op);
                    out.push_str(" ?");
                }
                Element::Group { connector, elements } => {
                    out.push_str(connector.sql());
                    out.push('(');
                    Self::emit_conditions(elements, alias, out);
                    out.push(')');
                }
                _ => {}
            }
        }
    }

    fn where_clause(&self) -> Option<String> {
        let has_conditions = self
            .elements
            .iter()
            .any(|e| matches!(e, Element::Where { .. } | Element::Group { .. }));
        if !has_conditions {
            return None;
        }
        let mut out = String::new();
        Self::emit_conditions(&self.elements, self.alias.as_deref(), &mut out);
        Some(out)
    }

    fn sort_clause(&self) -> Option<String> {
        let parts: Vec<String> = self
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Sort { field, descending } => Some(if *descending {
                    format!("{} DESC", self.qualify(field))
                } else {
                    self.qualify(field)
                }),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }

    fn group_clause(&self) -> Option<String> {
        let parts: Vec<String> = self
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::GroupOn { field } => Some(self.qualify(field)),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }

    fn join_clause(&self) -> String {
        let mut out = String::new();
        for join in &self.joins {
            out.push(' ');
            out.push_str(join.mode.sql());
            out.push(' ');
            out.push_str(&join.target.name);
            out.push(' ');
            out.push_str(&join.alias);
            out.push_str(" ON ");
            match &join.on {
                JoinOn::Fields(left, right) => {
                    out.push_str(&self.qualify(left));
                    out.push_str(" = ");
                    if right.contains('.') {
                        out.push_str(right);
                    } else {
                        out.push_str(&format!("{}.{}", join.alias, right));
                    }
                }
                JoinOn::Raw(expr) => out.push_str(expr),
            }
        }
        out
    }

    fn build_select(&self, translator: &Translator) -> Result<String> {
        let projection = if self.fields.is_empty() {
            self.desc
                .fields()
                .iter()
                .map(|f| self.qualify(&f.name))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            self.fields
                .iter()
                .map(|f| self.qualify(f))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = String::from("SELECT ");
        if let Some(top) = self.top {
            if translator.dialect().is_mssql() {
                sql.push_str(&format!("TOP {} ", top));
            } else if translator.dialect().is_firebird() {
                sql.push_str(&format!("FIRST {} ", top));
            }
        }
        sql.push_str(&projection);
        sql.push_str(" FROM ");
        sql.push_str(&self.desc.name);
        if let Some(alias) = &self.alias {
            sql.push(' ');
            sql.push_str(alias);
        }
        sql.push_str(&self.join_clause());
        if let Some(where_sql) = self.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        if let Some(group_sql) = self.group_clause() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_sql);
        }
        if let Some(sort_sql) = self.sort_clause() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&sort_sql);
        }
        if let Some(top) = self.top {
            if !translator.dialect().is_mssql() && !translator.dialect().is_firebird() {
                sql.push_str(&format!(" LIMIT {}", top));
            }
        }
        Ok(sql)
    }

    fn build_insert(&self) -> Result<String> {
        if self.fields.is_empty() {
            return Err(DbError::Query("INSERT requires at least one field".into()));
        }
        if self.fields.len() != self.values.len() {
            return Err(DbError::Query(format!(
                "INSERT field count {} does not match value count {}",
                self.fields.len(),
                self.values.len()
            )));
        }
        let placeholders = vec!["?"; self.values.len()].join(", ");
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.desc.name,
            self.fields.join(", "),
            placeholders
        ))
    }

    fn build_update(&self, translator: &Translator) -> Result<String> {
        if self.fields.is_empty() {
            return Err(DbError::Query("UPDATE requires at least one field".into()));
        }
        // SET columns stay unqualified; not every dialect accepts an
        // alias there.
        let pairs = self
            .fields
            .iter()
            .map(|f| format!("{} = ?", f))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = match (&self.alias, translator.dialect().is_mssql()) {
            (Some(alias), true) => format!(
                "UPDATE {} SET {} FROM {} {}",
                alias, pairs, self.desc.name, alias
            ),
            (Some(alias), false) => format!("UPDATE {} {} SET {}", self.desc.name, alias, pairs),
            (None, _) => format!("UPDATE {} SET {}", self.desc.name, pairs),
        };
        if let Some(where_sql) = self.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        Ok(sql)
    }

    fn build_delete(&self, translator: &Translator) -> Result<String> {
        let mut sql = match (&self.alias, translator.dialect().is_mssql()) {
            (Some(alias), true) => format!("DELETE {} FROM {} {}", alias, self.desc.name, alias),
            (Some(alias), false) => format!("DELETE FROM {} {}", self.desc.name, alias),
            (None, _) => format!("DELETE FROM {}", self.desc.name),
        };
        if let Some(where_sql) = self.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        Ok(sql)
    }

    /// Assemble the statement in dialect order, run the snippet
    /// rewriter, and hand back the SQL with the captured parameters.
    pub fn build(&self, translator: &Translator) -> Result<(String, Vec<Value>)> {
        let sql = match self.query_type {
            QueryType::Undefined => {
                return Err(DbError::Query("query type was never assigned".into()))
            }
            QueryType::Select => self.build_select(translator)?,
            QueryType::Insert => self.build_insert()?,
            QueryType::Update => self.build_update(translator)?,
            QueryType::Delete => self.build_delete(translator)?,
        };
        Ok((translator.rewrite(&sql), self.values.clone()))
    }
}
