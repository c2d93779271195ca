use proptest::prelude::*;
use sdk::errors::EngineError;
use sdk::types::{ErrorKind, ExecutionResult};

// Error hints are static, user-safe strings and never echo the raw message.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::DuplicateTool(error_str.clone()),
            EngineError::UnknownTool(error_str.clone()),
            EngineError::Schema(error_str.clone()),
            EngineError::LLMProvider(error_str.clone()),
            EngineError::Automation(error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if error_str.len() > 8 {
                prop_assert!(!hint.contains(&error_str));
            }
        }
    }
}

// Failed envelopes always carry a kind and a message, never a payload.
proptest! {
    #[test]
    fn test_failure_envelope_shape(message in "\\PC*", kind_index in 0usize..7) {
        let kinds = [
            ErrorKind::ToolNotFound,
            ErrorKind::ParameterValidationError,
            ErrorKind::ToolExecutionError,
            ErrorKind::LoopDetected,
            ErrorKind::SessionNotActive,
            ErrorKind::StepContractViolation,
            ErrorKind::StepLimitExceeded,
        ];
        let kind = kinds[kind_index];
        let result = ExecutionResult::failure(kind, message.clone());

        prop_assert!(!result.success);
        prop_assert!(result.payload.is_none());
        prop_assert_eq!(result.error_kind, Some(kind));
        prop_assert_eq!(result.error.as_deref(), Some(message.as_str()));
        prop_assert_eq!(result.loop_detected, kind == ErrorKind::LoopDetected);

        let json = serde_json::to_string(&result).unwrap();
        let parsed: ExecutionResult = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, result);
    }
}
