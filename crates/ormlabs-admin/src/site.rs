//! The admin site registry.
//!
//! [`AdminSite`] holds one [`ModelAdmin`] per registered model. Registration
//! checks every configured name against the model's metadata, so a typo in a
//! `list_display` fails when the site is assembled rather than when a page is
//! rendered.

use std::collections::BTreeMap;

use ormlabs_core::{LabsError, LabsResult};
use ormlabs_db::{DbExecutor, FieldType, Model, ModelMeta};

use crate::changelist::{build_changelist, ChangeList, ChangeListParams};
use crate::model_admin::{ModelAdmin, STR_COLUMN};

fn improperly(message: String) -> LabsError {
    LabsError::ImproperlyConfigured(message)
}

/// Checks `admin` against `meta`.
///
/// # Errors
///
/// Returns `ImproperlyConfigured` naming the first offending option.
pub fn validate_admin(meta: &ModelMeta, admin: &ModelAdmin) -> LabsResult<()> {
    let label = meta.label();
    if admin.model_key() != label {
        return Err(improperly(format!(
            "ModelAdmin for '{}' cannot be registered for '{label}'",
            admin.model_key()
        )));
    }

    for (i, name) in admin.list_display.iter().enumerate() {
        if name == STR_COLUMN || name == "pk" {
            continue;
        }
        match meta.get_field(name) {
            None => {
                return Err(improperly(format!(
                    "The value of 'list_display[{i}]' refers to '{name}', which is not a field of '{label}'"
                )))
            }
            Some(field) if matches!(field.field_type, FieldType::ManyToManyField { .. }) => {
                return Err(improperly(format!(
                    "The value of 'list_display[{i}]' must not be a many-to-many field"
                )))
            }
            Some(_) => {}
        }
    }

    for (i, name) in admin.list_filter.iter().enumerate() {
        if meta.get_field(name).is_none() {
            return Err(improperly(format!(
                "The value of 'list_filter[{i}]' refers to '{name}', which does not refer to a Field"
            )));
        }
    }

    for (i, name) in admin.search_fields.iter().enumerate() {
        let bare = name.trim_start_matches(['^', '=', '@']);
        if meta.get_field(bare).is_none() {
            return Err(improperly(format!(
                "The value of 'search_fields[{i}]' refers to '{bare}', which is not a field of '{label}'"
            )));
        }
    }

    for (i, name) in admin.ordering.iter().enumerate() {
        let bare = name.strip_prefix('-').unwrap_or(name);
        if bare != "pk" && meta.get_field(bare).is_none() {
            return Err(improperly(format!(
                "The value of 'ordering[{i}]' refers to '{bare}', which is not a field of '{label}'"
            )));
        }
    }
    Ok(())
}

/// The admin site: registered model admins keyed by `"app.model"`.
///
/// # Examples
///
/// ```
/// use ormlabs_admin::site::AdminSite;
///
/// let site = AdminSite::new("admin");
/// assert_eq!(site.name(), "admin");
/// assert_eq!(site.model_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AdminSite {
    name: String,
    registered_models: BTreeMap<String, ModelAdmin>,
}

impl AdminSite {
    /// Creates an empty admin site.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            registered_models: BTreeMap::new(),
        }
    }

    /// Returns the site name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `M` with its admin configuration.
    ///
    /// # Errors
    ///
    /// Returns `ImproperlyConfigured` if `M` is already registered or `admin`
    /// does not validate against `M`'s metadata.
    pub fn register<M: Model>(&mut self, admin: ModelAdmin) -> LabsResult<()> {
        let meta = M::meta();
        let label = meta.label();
        if self.registered_models.contains_key(&label) {
            return Err(improperly(format!("The model {label} is already registered")));
        }
        validate_admin(meta, &admin)?;
        tracing::debug!(site = %self.name, model = %label, "registered model admin");
        self.registered_models.insert(label, admin);
        Ok(())
    }

    /// Registers `M` with the default configuration.
    pub fn register_default<M: Model>(&mut self) -> LabsResult<()> {
        self.register::<M>(ModelAdmin::for_model::<M>())
    }

    /// Unregisters a model. Returns `true` if it was registered.
    pub fn unregister(&mut self, model_key: &str) -> bool {
        self.registered_models.remove(model_key).is_some()
    }

    /// Returns the `ModelAdmin` for a registered model, if any.
    pub fn get_model_admin(&self, model_key: &str) -> Option<&ModelAdmin> {
        self.registered_models.get(model_key)
    }

    /// Returns whether a model is registered.
    pub fn is_registered(&self, model_key: &str) -> bool {
        self.registered_models.contains_key(model_key)
    }

    /// Returns the registered model keys, sorted.
    pub fn registered_models(&self) -> Vec<&str> {
        self.registered_models.keys().map(String::as_str).collect()
    }

    /// Returns the number of registered models.
    pub fn model_count(&self) -> usize {
        self.registered_models.len()
    }

    /// Groups the plural verbose names of registered models by app label.
    pub fn app_index(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut index: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for admin in self.registered_models.values() {
            index
                .entry(admin.app_label.as_str())
                .or_default()
                .push(admin.verbose_name_plural.as_str());
        }
        index
    }

    fn require(&self, model_key: &str) -> LabsResult<&ModelAdmin> {
        self.get_model_admin(model_key).ok_or_else(|| {
            improperly(format!("The model {model_key} is not registered with the admin"))
        })
    }

    /// Builds one page of a registered model's change list.
    pub fn changelist(
        &self,
        db: &dyn DbExecutor,
        model_key: &str,
        params: &ChangeListParams,
    ) -> LabsResult<ChangeList> {
        build_changelist(db, self.require(model_key)?, params)
    }

    /// Renders the first page of a change list as rows of strings.
    pub fn changelist_rows(&self, db: &dyn DbExecutor, model_key: &str) -> LabsResult<Vec<Vec<String>>> {
        Ok(self
            .changelist(db, model_key, &ChangeListParams::new())?
            .rows
            .into_iter()
            .map(|row| row.cells)
            .collect())
    }
}
