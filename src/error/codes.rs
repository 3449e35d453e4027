/// Error code registry for cfn-alias
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Template document errors
/// - 3000-3999: Cross-alias conflicts
/// - 4000-4999: Precondition failures
/// - 5000-5999: Stack orchestration errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_YAML: u16 = 1002;
    pub const CONFIG_INVALID_JSON: u16 = 1003;
    pub const CONFIG_MISSING_REQUIRED: u16 = 1004;
    pub const CONFIG_INVALID_STAGE_SETTINGS: u16 = 1005;

    // Template errors (2000-2999)
    pub const TEMPLATE_GENERIC: u16 = 2000;
    pub const TEMPLATE_INVALID_PATH: u16 = 2001;
    pub const TEMPLATE_CORRUPT_SNAPSHOT: u16 = 2002;
    pub const TEMPLATE_UNEXPECTED_POLICY_SHAPE: u16 = 2003;
    pub const TEMPLATE_MISSING_RESOURCE: u16 = 2004;

    // Conflict errors (3000-3999)
    pub const CONFLICT_GENERIC: u16 = 3000;
    pub const CONFLICT_RESOURCE: u16 = 3001;
    pub const CONFLICT_OUTPUT: u16 = 3002;

    // Precondition errors (4000-4999)
    pub const PRECONDITION_GENERIC: u16 = 4000;
    pub const PRECONDITION_INVALID_ALIAS_CHARACTER: u16 = 4001;
    pub const PRECONDITION_INVALID_STACK_NAME: u16 = 4002;
    pub const PRECONDITION_INCOMPATIBLE_STACK: u16 = 4003;
    pub const PRECONDITION_OTHER_ALIASES_DEPLOYED: u16 = 4004;
    pub const PRECONDITION_MASTER_STACK_MISSING: u16 = 4005;
    pub const PRECONDITION_CANNOT_REMOVE_STAGE_ALIAS: u16 = 4006;
    pub const PRECONDITION_ALIAS_NOT_DEPLOYED: u16 = 4007;

    // Stack orchestration errors (5000-5999)
    pub const STACK_GENERIC: u16 = 5000;
    pub const STACK_NOT_FOUND: u16 = 5001;
    pub const STACK_EXPORT_NOT_FOUND: u16 = 5002;
    pub const STACK_NO_UPDATES: u16 = 5003;
    pub const STACK_REQUEST_FAILED: u16 = 5004;
    pub const STACK_OPERATION_FAILED: u16 = 5005;
    pub const STACK_IO_ERROR: u16 = 5006;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
    pub const OTHER_INTERNAL_ERROR: u16 = 9001;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        // Configuration errors
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid YAML syntax in configuration",
        1003 => "Invalid JSON syntax in configuration",
        1004 => "Required configuration field is missing",
        1005 => "Invalid API stage settings",

        // Template errors
        2000 => "Generic template error",
        2001 => "Property path does not match the document shape",
        2002 => "Deployed template snapshot could not be parsed",
        2003 => "Execution role does not carry exactly one inline policy",
        2004 => "Referenced resource is missing",

        // Conflict errors
        3000 => "Generic conflict",
        3001 => "Resource is deployed by another alias with a different definition",
        3002 => "Output is deployed by another alias with a different definition",

        // Precondition errors
        4000 => "Generic precondition failure",
        4001 => "Alias contains an unsupported character",
        4002 => "Alias stack name is invalid",
        4003 => "Deployed stacks use an incompatible structure",
        4004 => "Other aliases are still deployed",
        4005 => "Master alias stack is missing",
        4006 => "The stage alias cannot be removed directly",
        4007 => "Alias is not deployed",

        // Stack orchestration errors
        5000 => "Generic stack error",
        5001 => "Stack not found",
        5002 => "Export not found",
        5003 => "No updates are to be performed",
        5004 => "Provider request failed",
        5005 => "Stack operation failed",
        5006 => "Local stack state I/O error",

        // Other errors
        9000 => "Generic error",
        9001 => "Internal error",

        _ => "Unknown error code",
    }
}
