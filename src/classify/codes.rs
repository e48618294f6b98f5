use super::ErrorCategory;

/// Known PostgreSQL SQLSTATE codes: category, stable code, client message
pub struct KnownCode {
    pub sqlstate: &'static str,
    pub category: ErrorCategory,
    pub code: &'static str,
    pub message: &'static str,
}

const fn known(sqlstate: &'static str, category: ErrorCategory, code: &'static str, message: &'static str) -> KnownCode {
    KnownCode { sqlstate, category, code, message }
}

pub const KNOWN_CODES: &[KnownCode] = &[
    // integrity
    known("23505", ErrorCategory::Conflict, "UNIQUE_VIOLATION", "A unique constraint violation occurred. The value already exists."),
    known("23502", ErrorCategory::ValidationFailed, "NOT_NULL_VIOLATION", "Null constraint violation. A required field is missing a value."),
    known("23503", ErrorCategory::ValidationFailed, "FOREIGN_KEY_VIOLATION", "A foreign key constraint violation occurred. Please check the related records."),
    known("23514", ErrorCategory::ValidationFailed, "CHECK_VIOLATION", "A constraint failed on the database. Please review the provided values."),
    known("22001", ErrorCategory::ValidationFailed, "VALUE_TOO_LONG", "The value provided is too long for the field's type."),
    known("22P02", ErrorCategory::ValidationFailed, "INVALID_VALUE", "Invalid value provided for a field. Please check the data type and format."),
    known("22007", ErrorCategory::ValidationFailed, "INVALID_DATETIME", "Invalid date or time value provided."),
    // concurrency
    known("40001", ErrorCategory::Conflict, "SERIALIZATION_FAILURE", "The operation was aborted due to a conflict. Please retry the operation."),
    known("40P01", ErrorCategory::Conflict, "DEADLOCK_DETECTED", "The operation was aborted due to a conflict. Please retry the operation."),
    known("55P03", ErrorCategory::Conflict, "LOCK_NOT_AVAILABLE", "A resource is in use and cannot be modified. Please retry the operation later."),
    // time and availability
    known("57014", ErrorCategory::Timeout, "STATEMENT_TIMEOUT", "The database operation timed out. Please try again later."),
    known("57P01", ErrorCategory::Unavailable, "ADMIN_SHUTDOWN", "The database connection was lost. Please try again."),
    known("53300", ErrorCategory::Unavailable, "TOO_MANY_CONNECTIONS", "The database is not accepting connections. Please try again later."),
    known("28P01", ErrorCategory::Unavailable, "DATABASE_AUTH_FAILED", "Authentication failed against the database."),
    known("28000", ErrorCategory::Unavailable, "DATABASE_AUTH_FAILED", "Authentication failed against the database."),
    known("3D000", ErrorCategory::Unavailable, "DATABASE_NOT_FOUND", "The database does not exist."),
    // schema drift
    known("42P01", ErrorCategory::Unknown, "TABLE_NOT_FOUND", "The database schema is not in sync with the application."),
    known("42703", ErrorCategory::Unknown, "COLUMN_NOT_FOUND", "The database schema is not in sync with the application."),
];

pub fn lookup(sqlstate: &str) -> Option<&'static KnownCode> {
    KNOWN_CODES.iter().find(|k| k.sqlstate == sqlstate)
}

/// Fallback by SQLSTATE class (first two characters)
pub fn class_category(sqlstate: &str) -> ErrorCategory {
    match sqlstate.get(..2) {
        Some("08") | Some("53") | Some("57") => ErrorCategory::Unavailable,
        Some("22") => ErrorCategory::ValidationFailed,
        Some("23") | Some("40") => ErrorCategory::Conflict,
        _ => ErrorCategory::Unknown,
    }
}
