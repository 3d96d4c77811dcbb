//! Structured logging integration for events
//!
//! Library crates report what they did as events; this module turns them
//! into tracing records with structured fields.

use seclabel_events::{AppEvent, EventLevel, EventMessage, LabelEvent};

/// Emit a tracing record at a level only known at runtime
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            EventLevel::Error => tracing::error!($($arg)+),
            EventLevel::Warn => tracing::warn!($($arg)+),
            EventLevel::Info => tracing::info!($($arg)+),
            EventLevel::Debug => tracing::debug!($($arg)+),
            EventLevel::Trace => tracing::trace!($($arg)+),
        }
    };
}

/// Log an event through tracing at the level recorded in its metadata
pub fn log_event_with_tracing(message: &EventMessage) {
    let meta = &message.meta;
    let AppEvent::Label(label_event) = &message.event;
    match label_event {
        LabelEvent::RequestDispatched {
            request_id,
            operation,
            input,
        } => {
            log_at!(
                meta.level,
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                request_id = %request_id,
                operation = %operation,
                input = %input,
                "Request dispatched"
            );
        }
        LabelEvent::RequestCompleted {
            request_id,
            operation,
            labeled,
            duration_ms,
        } => {
            log_at!(
                meta.level,
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                request_id = %request_id,
                operation = %operation,
                labeled = labeled,
                duration_ms = duration_ms,
                "Request completed"
            );
        }
        LabelEvent::RequestFailed {
            request_id,
            operation,
            failure,
            duration_ms,
        } => {
            log_at!(
                meta.level,
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                request_id = %request_id,
                operation = %operation,
                code = ?failure.code,
                errno = ?failure.errno,
                message = %failure.message,
                hint = ?failure.hint,
                duration_ms = duration_ms,
                "Request failed"
            );
        }
        LabelEvent::AttributeChanged { attribute, context } => {
            log_at!(
                meta.level,
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                attribute = attribute.as_str(),
                context = ?context,
                "Process attribute changed"
            );
        }
        LabelEvent::PolicyLoaded {
            policy_type,
            path,
            specs,
            substitutions,
        } => {
            log_at!(
                meta.level,
                source = meta.source.as_str(),
                event_id = %meta.event_id,
                policy_type = %policy_type,
                path = %path.display(),
                specs = specs,
                substitutions = substitutions,
                "Policy database loaded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seclabel_errors::LabelError;
    use seclabel_events::FailureContext;

    #[test]
    fn failed_request_is_logged_at_error_level() {
        let message = EventMessage::new(AppEvent::Label(LabelEvent::RequestFailed {
            request_id: seclabel_dispatch::RequestId::nil(),
            operation: "matchpathcon".into(),
            failure: FailureContext::from_label_error(&LabelError::from_errno("matchpathcon", 2)),
            duration_ms: 1,
        }));
        assert_eq!(message.meta.level, EventLevel::Error);
        // No subscriber installed; must not panic at any level.
        log_event_with_tracing(&message);
    }
}
