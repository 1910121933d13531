//! Model administration configuration.
//!
//! [`ModelAdmin`] describes how a model's change list is shown: which columns,
//! which sidebar filters, what the search box looks at, the default ordering
//! and the page size. It is built with a builder pattern and validated against
//! the model's metadata when registered on an [`AdminSite`](crate::site::AdminSite).

use ormlabs_db::Model;
use serde::{Deserialize, Serialize};

/// The pseudo-column rendering a record's human-readable representation.
pub const STR_COLUMN: &str = "__str__";

/// Configuration for how a model is listed in the admin.
///
/// # Examples
///
/// ```
/// use ormlabs_admin::model_admin::ModelAdmin;
///
/// let admin = ModelAdmin::new("labs", "registration")
///     .list_display(vec!["id", "event", "member", "ticket"])
///     .list_filter(vec!["event", "member"])
///     .ordering(vec!["-registered_on"])
///     .list_per_page(25);
/// assert_eq!(admin.model_key(), "labs.registration");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAdmin {
    /// The application label (e.g., "labs").
    pub app_label: String,
    /// The model name in lowercase (e.g., "member").
    pub model_name: String,
    /// The human-readable verbose name.
    pub verbose_name: String,
    /// The human-readable plural verbose name.
    pub verbose_name_plural: String,
    /// Columns of the change list.
    pub list_display: Vec<String>,
    /// Fields offered as sidebar filters.
    pub list_filter: Vec<String>,
    /// Fields searched when using the search box.
    pub search_fields: Vec<String>,
    /// Default ordering (prefix with "-" for descending).
    pub ordering: Vec<String>,
    /// Number of rows per page.
    pub list_per_page: usize,
    /// Shown for NULL values and unset relations.
    pub empty_value_display: String,
}

impl ModelAdmin {
    /// Creates a `ModelAdmin` with default configuration.
    pub fn new(app_label: impl Into<String>, model_name: impl Into<String>) -> Self {
        let model = model_name.into();
        let verbose = model.replace('_', " ");
        let verbose_plural = format!("{verbose}s");
        Self {
            app_label: app_label.into(),
            model_name: model,
            verbose_name: verbose,
            verbose_name_plural: verbose_plural,
            list_display: vec![STR_COLUMN.to_string()],
            list_filter: Vec::new(),
            search_fields: Vec::new(),
            ordering: Vec::new(),
            list_per_page: 100,
            empty_value_display: "-".to_string(),
        }
    }

    /// Creates a `ModelAdmin` for `M`, taking names from its metadata.
    pub fn for_model<M: Model>() -> Self {
        let meta = M::meta();
        Self::new(meta.app_label, meta.model_name)
            .verbose_name(meta.verbose_name.clone())
            .verbose_name_plural(meta.verbose_name_plural.clone())
    }

    /// Sets the verbose name.
    #[must_use]
    pub fn verbose_name(mut self, name: impl Into<String>) -> Self {
        self.verbose_name = name.into();
        self
    }

    /// Sets the plural verbose name.
    #[must_use]
    pub fn verbose_name_plural(mut self, name: impl Into<String>) -> Self {
        self.verbose_name_plural = name.into();
        self
    }

    /// Sets the columns of the change list.
    #[must_use]
    pub fn list_display(mut self, fields: Vec<&str>) -> Self {
        self.list_display = fields.into_iter().map(String::from).collect();
        self
    }

    /// Sets the sidebar filters.
    #[must_use]
    pub fn list_filter(mut self, fields: Vec<&str>) -> Self {
        self.list_filter = fields.into_iter().map(String::from).collect();
        self
    }

    /// Sets the fields to search over.
    #[must_use]
    pub fn search_fields(mut self, fields: Vec<&str>) -> Self {
        self.search_fields = fields.into_iter().map(String::from).collect();
        self
    }

    /// Sets the default ordering.
    #[must_use]
    pub fn ordering(mut self, fields: Vec<&str>) -> Self {
        self.ordering = fields.into_iter().map(String::from).collect();
        self
    }

    /// Sets the number of rows per page.
    #[must_use]
    pub const fn list_per_page(mut self, count: usize) -> Self {
        self.list_per_page = count;
        self
    }

    /// Sets the placeholder shown for empty values.
    #[must_use]
    pub fn empty_value_display(mut self, text: impl Into<String>) -> Self {
        self.empty_value_display = text.into();
        self
    }

    /// Returns the model key in `"app_label.model_name"` format.
    pub fn model_key(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }
}
