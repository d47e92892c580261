use thiserror::Error;

/// Rejections raised before a call reaches the worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Unknown tool '{name}'. Available tools: {}", .available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Tool '{tool}' requires a 'method' field. Allowed methods: {}", .allowed.join(", "))]
    MissingMethod { tool: String, allowed: Vec<String> },

    #[error("Tool '{tool}' received placeholder method '{value}'. Allowed methods: {}", .allowed.join(", "))]
    PlaceholderMethod {
        tool: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Unknown method '{method}' for tool '{tool}'. Allowed methods: {}", .allowed.join(", "))]
    UnknownMethod {
        tool: String,
        method: String,
        allowed: Vec<String>,
    },

    #[error("Tool '{tool}' expects 'method' to be a string, got {found}")]
    InvalidMethodType { tool: String, found: &'static str },

    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool family '{family}' is not available on this worker")]
    FamilyUnavailable { family: String },
}

impl RoutingError {
    /// Short machine-readable name for logs and error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            RoutingError::UnknownTool { .. } => "unknown_tool",
            RoutingError::MissingMethod { .. } => "missing_method",
            RoutingError::PlaceholderMethod { .. } => "placeholder_method",
            RoutingError::UnknownMethod { .. } => "unknown_method",
            RoutingError::InvalidMethodType { .. } => "invalid_method_type",
            RoutingError::InvalidArguments { .. } => "invalid_arguments",
            RoutingError::FamilyUnavailable { .. } => "family_unavailable",
        }
    }
}
