//! Event codes
//!
//! Codes below [`WEB_EXTENDED_BASE`] are reserved for events raised by the
//! framework itself. Applications raise custom events with codes at or
//! above it.

use crate::taxonomy::BuiltinEventType;

/// Code used when an event carries no specific code
pub const UNDEFINED_EVENT_CODE: i32 = 0;
/// Detail code used when an event carries no detail
pub const UNDEFINED_EVENT_DETAIL_CODE: i32 = 0;

pub const INVALID_EVENT_CODE: i32 = -1;

/// First code available to application-defined events
pub const WEB_EXTENDED_BASE: i32 = 100_000;

// Application lifetime codes
pub const APPLICATION_CODE_BASE: i32 = 1000;
pub const APPLICATION_START: i32 = APPLICATION_CODE_BASE + 1;
pub const APPLICATION_SHUTDOWN: i32 = APPLICATION_CODE_BASE + 2;
pub const APPLICATION_COMPILATION_START: i32 = APPLICATION_CODE_BASE + 3;
pub const APPLICATION_COMPILATION_END: i32 = APPLICATION_CODE_BASE + 4;
pub const APPLICATION_HEARTBEAT: i32 = APPLICATION_CODE_BASE + 5;
pub const APPLICATION_CODE_BASE_LAST: i32 = APPLICATION_CODE_BASE + 5;

// Request codes
pub const REQUEST_CODE_BASE: i32 = 2000;
pub const REQUEST_TRANSACTION_COMPLETE: i32 = REQUEST_CODE_BASE + 1;
pub const REQUEST_TRANSACTION_ABORT: i32 = REQUEST_CODE_BASE + 2;
pub const REQUEST_CODE_BASE_LAST: i32 = REQUEST_CODE_BASE + 2;

// Error codes
pub const ERROR_CODE_BASE: i32 = 3000;
pub const RUNTIME_ERROR_REQUEST_ABORT: i32 = ERROR_CODE_BASE + 1;
pub const RUNTIME_ERROR_VIEW_STATE_FAILURE: i32 = ERROR_CODE_BASE + 2;
pub const RUNTIME_ERROR_VALIDATION_FAILURE: i32 = ERROR_CODE_BASE + 3;
pub const RUNTIME_ERROR_POST_TOO_LARGE: i32 = ERROR_CODE_BASE + 4;
pub const RUNTIME_ERROR_UNHANDLED_EXCEPTION: i32 = ERROR_CODE_BASE + 5;
pub const WEB_ERROR_PARSER_ERROR: i32 = ERROR_CODE_BASE + 6;
pub const WEB_ERROR_COMPILATION_ERROR: i32 = ERROR_CODE_BASE + 7;
pub const WEB_ERROR_CONFIGURATION_ERROR: i32 = ERROR_CODE_BASE + 8;
pub const WEB_ERROR_OTHER_ERROR: i32 = ERROR_CODE_BASE + 9;
pub const WEB_ERROR_PROPERTY_DESERIALIZATION_ERROR: i32 = ERROR_CODE_BASE + 10;
pub const WEB_ERROR_OBJECT_STATE_FORMATTER_DESERIALIZATION_ERROR: i32 = ERROR_CODE_BASE + 11;
pub const RUNTIME_ERROR_WEB_RESOURCE_FAILURE: i32 = ERROR_CODE_BASE + 12;
pub const ERROR_CODE_BASE_LAST: i32 = ERROR_CODE_BASE + 12;

// Audit codes
pub const AUDIT_CODE_BASE: i32 = 4000;
pub const AUDIT_FORMS_AUTHENTICATION_SUCCESS: i32 = AUDIT_CODE_BASE + 1;
pub const AUDIT_MEMBERSHIP_AUTHENTICATION_SUCCESS: i32 = AUDIT_CODE_BASE + 2;
pub const AUDIT_URL_AUTHORIZATION_SUCCESS: i32 = AUDIT_CODE_BASE + 3;
pub const AUDIT_FILE_AUTHORIZATION_SUCCESS: i32 = AUDIT_CODE_BASE + 4;
pub const AUDIT_FORMS_AUTHENTICATION_FAILURE: i32 = AUDIT_CODE_BASE + 5;
pub const AUDIT_MEMBERSHIP_AUTHENTICATION_FAILURE: i32 = AUDIT_CODE_BASE + 6;
pub const AUDIT_URL_AUTHORIZATION_FAILURE: i32 = AUDIT_CODE_BASE + 7;
pub const AUDIT_FILE_AUTHORIZATION_FAILURE: i32 = AUDIT_CODE_BASE + 8;
pub const AUDIT_INVALID_VIEW_STATE_FAILURE: i32 = AUDIT_CODE_BASE + 9;
pub const AUDIT_UNHANDLED_SECURITY_EXCEPTION: i32 = AUDIT_CODE_BASE + 10;
pub const AUDIT_UNHANDLED_ACCESS_EXCEPTION: i32 = AUDIT_CODE_BASE + 11;
pub const AUDIT_CODE_BASE_LAST: i32 = AUDIT_CODE_BASE + 11;

// Misc codes
pub const MISC_CODE_BASE: i32 = 6000;
pub const WEB_EVENT_PROVIDER_INFORMATION: i32 = MISC_CODE_BASE + 1;
pub const MISC_CODE_BASE_LAST: i32 = MISC_CODE_BASE + 1;

/// True for codes reserved to framework-raised events
pub fn is_system_code(code: i32) -> bool {
    code < WEB_EXTENDED_BASE
}

/// Concrete built-in type the framework raises for a system code.
///
/// Returns `None` for codes that are never raised as events, including
/// [`WEB_EVENT_PROVIDER_INFORMATION`].
pub fn system_event_type(code: i32) -> Option<BuiltinEventType> {
    use BuiltinEventType::*;

    let event_type = match code {
        APPLICATION_START
        | APPLICATION_SHUTDOWN
        | APPLICATION_COMPILATION_START
        | APPLICATION_COMPILATION_END => WebApplicationLifetimeEvent,
        APPLICATION_HEARTBEAT => WebHeartbeatEvent,

        REQUEST_TRANSACTION_COMPLETE | REQUEST_TRANSACTION_ABORT => WebRequestEvent,

        RUNTIME_ERROR_REQUEST_ABORT
        | RUNTIME_ERROR_VIEW_STATE_FAILURE
        | RUNTIME_ERROR_VALIDATION_FAILURE
        | RUNTIME_ERROR_POST_TOO_LARGE
        | RUNTIME_ERROR_UNHANDLED_EXCEPTION
        | RUNTIME_ERROR_WEB_RESOURCE_FAILURE => WebRequestErrorEvent,

        WEB_ERROR_PARSER_ERROR
        | WEB_ERROR_COMPILATION_ERROR
        | WEB_ERROR_CONFIGURATION_ERROR
        | WEB_ERROR_OTHER_ERROR
        | WEB_ERROR_PROPERTY_DESERIALIZATION_ERROR
        | WEB_ERROR_OBJECT_STATE_FORMATTER_DESERIALIZATION_ERROR => WebErrorEvent,

        AUDIT_FORMS_AUTHENTICATION_SUCCESS | AUDIT_MEMBERSHIP_AUTHENTICATION_SUCCESS => {
            WebAuthenticationSuccessAuditEvent
        }
        AUDIT_URL_AUTHORIZATION_SUCCESS | AUDIT_FILE_AUTHORIZATION_SUCCESS => WebSuccessAuditEvent,
        AUDIT_FORMS_AUTHENTICATION_FAILURE | AUDIT_MEMBERSHIP_AUTHENTICATION_FAILURE => {
            WebAuthenticationFailureAuditEvent
        }
        AUDIT_URL_AUTHORIZATION_FAILURE
        | AUDIT_FILE_AUTHORIZATION_FAILURE
        | AUDIT_UNHANDLED_SECURITY_EXCEPTION
        | AUDIT_UNHANDLED_ACCESS_EXCEPTION => WebFailureAuditEvent,
        AUDIT_INVALID_VIEW_STATE_FAILURE => WebViewStateFailureAuditEvent,

        _ => return None,
    };

    Some(event_type)
}

/// Short default message for a system code
pub fn default_message(code: i32) -> &'static str {
    match code {
        APPLICATION_START => "Application is starting.",
        APPLICATION_SHUTDOWN => "Application is shutting down.",
        APPLICATION_COMPILATION_START => "Application compilation is starting.",
        APPLICATION_COMPILATION_END => "Application compilation has ended.",
        APPLICATION_HEARTBEAT => "Application heartbeat.",
        REQUEST_TRANSACTION_COMPLETE => "Transaction completed.",
        REQUEST_TRANSACTION_ABORT => "Transaction aborted.",
        RUNTIME_ERROR_REQUEST_ABORT => "The request was aborted.",
        RUNTIME_ERROR_VIEW_STATE_FAILURE => "View state verification failed.",
        RUNTIME_ERROR_VALIDATION_FAILURE => "Request validation failed.",
        RUNTIME_ERROR_POST_TOO_LARGE => "Posted content exceeded the allowed length.",
        RUNTIME_ERROR_UNHANDLED_EXCEPTION => "An unhandled exception has occurred.",
        RUNTIME_ERROR_WEB_RESOURCE_FAILURE => "A web resource request failed.",
        WEB_ERROR_PARSER_ERROR => "A parser error has occurred.",
        WEB_ERROR_COMPILATION_ERROR => "A compilation error has occurred.",
        WEB_ERROR_CONFIGURATION_ERROR => "A configuration error has occurred.",
        WEB_ERROR_OTHER_ERROR => "An error has occurred.",
        WEB_ERROR_PROPERTY_DESERIALIZATION_ERROR => "A property could not be deserialized.",
        WEB_ERROR_OBJECT_STATE_FORMATTER_DESERIALIZATION_ERROR => {
            "The state information could not be deserialized."
        }
        AUDIT_FORMS_AUTHENTICATION_SUCCESS => "Forms authentication succeeded.",
        AUDIT_MEMBERSHIP_AUTHENTICATION_SUCCESS => "Membership credential verification succeeded.",
        AUDIT_URL_AUTHORIZATION_SUCCESS => "URL authorization succeeded.",
        AUDIT_FILE_AUTHORIZATION_SUCCESS => "File authorization succeeded.",
        AUDIT_FORMS_AUTHENTICATION_FAILURE => "Forms authentication failed.",
        AUDIT_MEMBERSHIP_AUTHENTICATION_FAILURE => "Membership credential verification failed.",
        AUDIT_URL_AUTHORIZATION_FAILURE => "URL authorization failed.",
        AUDIT_FILE_AUTHORIZATION_FAILURE => "File authorization failed.",
        AUDIT_INVALID_VIEW_STATE_FAILURE => "View state verification failed.",
        AUDIT_UNHANDLED_SECURITY_EXCEPTION => "An unhandled security exception has occurred.",
        AUDIT_UNHANDLED_ACCESS_EXCEPTION => "An unhandled access exception has occurred.",
        _ => "",
    }
}
