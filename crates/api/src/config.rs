use serde::Deserialize;

const DEFAULT_MAX_BODY_SIZE: usize = 10 << 20;

/// Options of the argument binder, built once at startup and shared by every route.
///
/// It can be written in code or loaded with serde, missing keys take their defaults:
/// ```
/// # use micro_api::BinderConfig;
/// let config: BinderConfig = serde_json::from_str(r#"{"max_body_size": 4096}"#).unwrap();
/// assert!(config.ignore_unknown_keys());
/// assert_eq!(config.max_body_size(), 4096);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BinderConfig {
    ignore_unknown_keys: bool,
    max_body_size: usize,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self { ignore_unknown_keys: true, max_body_size: DEFAULT_MAX_BODY_SIZE }
    }
}

impl BinderConfig {
    #[must_use]
    pub fn with_ignore_unknown_keys(mut self, ignore_unknown_keys: bool) -> Self {
        self.ignore_unknown_keys = ignore_unknown_keys;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Keys of the query, form or path source matching no field are skipped when `true`,
    /// rejected otherwise.
    pub fn ignore_unknown_keys(&self) -> bool {
        self.ignore_unknown_keys
    }

    /// Upper bound of a buffered request body, in bytes.
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}
