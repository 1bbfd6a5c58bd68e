//! §7 error taxonomy: classification, severity, and recovery strategy for
//! agent-failure messages. Pure functions, no state.

use crate::types::{ErrorCategory, ErrorSeverity, RecoveryStrategy};

/// Keyword-rule classification of a raw error message into the closed
/// §7 taxonomy. Order matters: more specific categories are checked first.
pub fn classify(message: &str) -> ErrorCategory {
    let text = message.to_lowercase();

    if text.contains("econnrefused") || text.contains("connection refused") || text.contains("enotfound") || text.contains("dns") {
        return ErrorCategory::NetworkError;
    }
    if text.contains("timed out") || text.contains("timeout") || text.contains("etimedout") {
        return ErrorCategory::Timeout;
    }
    if text.contains("rate limit") || text.contains("429") || text.contains("too many requests") {
        return ErrorCategory::ApiRateLimit;
    }
    if text.contains("unauthorized") || text.contains("401") || text.contains("authentication") || text.contains("invalid token") {
        return ErrorCategory::AuthenticationError;
    }
    if text.contains("forbidden") || text.contains("403") || text.contains("permission denied") {
        return ErrorCategory::PermissionError;
    }
    if text.contains("out of memory") || text.contains("disk full") || text.contains("resource exhausted") || text.contains("enospc") {
        return ErrorCategory::ResourceExhausted;
    }
    if text.contains("version mismatch") || text.contains("incompatible version") {
        return ErrorCategory::VersionMismatch;
    }
    if text.contains("module not found") || text.contains("cannot find module") || text.contains("no such file") || text.contains("missing dependency") {
        return ErrorCategory::MissingDependency;
    }
    if text.contains("config") && (text.contains("invalid") || text.contains("missing")) {
        return ErrorCategory::ConfigurationError;
    }
    if text.contains("syntax error") || text.contains("unexpected token") {
        return ErrorCategory::SyntaxError;
    }
    if text.contains("compilation failed") || text.contains("compile error") || text.contains("cannot compile") {
        return ErrorCategory::CompilationError;
    }
    if text.contains("assertion") || text.contains("expected") && text.contains("got") || text.contains("logic error") {
        return ErrorCategory::LogicError;
    }

    ErrorCategory::Unknown
}

/// Severity derived from category plus urgency markers in the message.
pub fn severity(category: ErrorCategory, message: &str) -> ErrorSeverity {
    let text = message.to_lowercase();
    let high_category = matches!(
        category,
        ErrorCategory::CompilationError
            | ErrorCategory::SyntaxError
            | ErrorCategory::AuthenticationError
            | ErrorCategory::MissingDependency
            | ErrorCategory::VersionMismatch
    );

    if text.contains("fatal") {
        return ErrorSeverity::Critical;
    }
    if high_category || text.contains("blocker") {
        return ErrorSeverity::High;
    }
    match category {
        ErrorCategory::ResourceExhausted | ErrorCategory::PermissionError => ErrorSeverity::Medium,
        ErrorCategory::NetworkError | ErrorCategory::Timeout | ErrorCategory::ApiRateLimit => ErrorSeverity::Low,
        _ => ErrorSeverity::Medium,
    }
}

/// Recovery strategy per (category, message) — network errors retry with
/// backoff only when the connection was actively refused; other network
/// failures (DNS/ENOTFOUND) just retry.
pub fn recovery_strategy(category: ErrorCategory, message: &str) -> RecoveryStrategy {
    match category {
        ErrorCategory::MissingDependency | ErrorCategory::Timeout => RecoveryStrategy::Retry,
        ErrorCategory::NetworkError => {
            let text = message.to_lowercase();
            if text.contains("econnrefused") || text.contains("connection refused") {
                RecoveryStrategy::RetryBackoff
            } else {
                RecoveryStrategy::Retry
            }
        }
        ErrorCategory::ApiRateLimit | ErrorCategory::ResourceExhausted => RecoveryStrategy::RetryBackoff,
        ErrorCategory::VersionMismatch | ErrorCategory::ConfigurationError => RecoveryStrategy::Fallback,
        ErrorCategory::CompilationError | ErrorCategory::SyntaxError => RecoveryStrategy::Abort,
        ErrorCategory::AuthenticationError | ErrorCategory::PermissionError | ErrorCategory::LogicError | ErrorCategory::Unknown => {
            RecoveryStrategy::Manual
        }
    }
}

pub fn is_recoverable(category: ErrorCategory) -> bool {
    !matches!(
        category,
        ErrorCategory::AuthenticationError | ErrorCategory::PermissionError | ErrorCategory::LogicError | ErrorCategory::Unknown
    )
}
