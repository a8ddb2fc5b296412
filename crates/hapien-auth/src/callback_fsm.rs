//! Magic-link callback state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐ SessionMissing
//! │     Polling     │ ◄──────────┐
//! └────────┬────────┘ ───────────┘
//!          │
//!          ├── SessionFailed ─────► SessionError
//!          ├── AttemptsExhausted ─► TimedOut
//!          │
//!          │ SessionFound
//!          ▼
//! ┌─────────────────┐
//! │   Reconciling   │
//! └────────┬────────┘
//!          ├── OutsideApp ────────► ReturnToApp
//!          ├── ProfileCreated ────► NewProfile
//!          ├── ProfileIncomplete ─► IncompleteProfile
//!          ├── ProfileComplete ───► CompleteProfile
//!          └── ReconcileFailed ───► UnexpectedError
//! ```
//!
//! Every state other than `Polling` and `Reconciling` is terminal.

use rust_fsm::*;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub callback_machine(Polling)

    Polling => {
        SessionMissing => Polling,
        SessionFound => Reconciling,
        SessionFailed => SessionError,
        AttemptsExhausted => TimedOut
    },
    Reconciling => {
        // Signed in from a browser tab; the app picks up the session itself
        OutsideApp => ReturnToApp,
        // No profile existed; a minimal one was inserted
        ProfileCreated => NewProfile,
        // Profile exists without a display name
        ProfileIncomplete => IncompleteProfile,
        ProfileComplete => CompleteProfile,
        ReconcileFailed => UnexpectedError
    }
}

pub use callback_machine::Input as CallbackMachineInput;
pub use callback_machine::State as CallbackMachineState;
pub use callback_machine::StateMachine as CallbackMachine;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_polling() {
        let machine = CallbackMachine::new();
        assert_eq!(*machine.state(), CallbackMachineState::Polling);
    }

    #[test]
    fn test_polling_loops_until_found() {
        let mut machine = CallbackMachine::new();

        for _ in 0..9 {
            machine.consume(&CallbackMachineInput::SessionMissing).unwrap();
            assert_eq!(*machine.state(), CallbackMachineState::Polling);
        }

        machine.consume(&CallbackMachineInput::SessionFound).unwrap();
        assert_eq!(*machine.state(), CallbackMachineState::Reconciling);

        machine
            .consume(&CallbackMachineInput::ProfileComplete)
            .unwrap();
        assert_eq!(*machine.state(), CallbackMachineState::CompleteProfile);
        assert!(machine.consume(&CallbackMachineInput::SessionFound).is_err());
    }

    #[test]
    fn test_polling_terminal_transitions() {
        let mut machine = CallbackMachine::new();
        machine
            .consume(&CallbackMachineInput::AttemptsExhausted)
            .unwrap();
        assert_eq!(*machine.state(), CallbackMachineState::TimedOut);

        let mut machine = CallbackMachine::new();
        machine.consume(&CallbackMachineInput::SessionFailed).unwrap();
        assert_eq!(*machine.state(), CallbackMachineState::SessionError);
    }

    #[test]
    fn test_reconcile_outcomes() {
        let cases = [
            (CallbackMachineInput::OutsideApp, CallbackMachineState::ReturnToApp),
            (CallbackMachineInput::ProfileCreated, CallbackMachineState::NewProfile),
            (
                CallbackMachineInput::ProfileIncomplete,
                CallbackMachineState::IncompleteProfile,
            ),
            (
                CallbackMachineInput::ReconcileFailed,
                CallbackMachineState::UnexpectedError,
            ),
        ];

        for (input, expected) in cases {
            let mut machine = CallbackMachine::new();
            machine.consume(&CallbackMachineInput::SessionFound).unwrap();
            machine.consume(&input).unwrap();
            assert_eq!(*machine.state(), expected);
        }
    }

    #[test]
    fn test_cannot_reconcile_without_session() {
        let mut machine = CallbackMachine::new();

        let result = machine.consume(&CallbackMachineInput::ProfileComplete);
        assert!(result.is_err());
        assert_eq!(*machine.state(), CallbackMachineState::Polling);
    }

    #[test]
    fn test_terminal_states_reject_input() {
        let mut machine = CallbackMachine::new();
        machine
            .consume(&CallbackMachineInput::AttemptsExhausted)
            .unwrap();

        assert!(machine.consume(&CallbackMachineInput::SessionFound).is_err());
        assert!(machine
            .consume(&CallbackMachineInput::SessionMissing)
            .is_err());
        assert_eq!(*machine.state(), CallbackMachineState::TimedOut);
    }
}
