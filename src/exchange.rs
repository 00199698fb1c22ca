//! Request-scoped carrier for strategy input and output.
//!
//! One [`Exchange`] travels with a single request. It is moved by value into a
//! strategy and handed back with the output attached, so no two requests ever
//! share one. Each [`StrategyKind`] owns its own slot: a read under a kind that
//! was never written fails instead of yielding a zeroed identifier.

use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result, Slot};
use crate::strategy::{Payload, StrategyInput, StrategyKind, StrategyOutput};

#[derive(Debug, Clone, Default)]
pub struct Exchange {
    inputs: HashMap<StrategyKind, StrategyInput>,
    outputs: HashMap<StrategyKind, StrategyOutput>,
    session: Option<Uuid>,
}

impl Exchange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `input` under its own kind.
    #[must_use]
    pub fn with_input(mut self, input: StrategyInput) -> Self {
        self.inputs.insert(input.kind(), input);
        self
    }

    /// Input stored under `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInExchange`] if nothing was stored for `kind`.
    pub fn input(&self, kind: StrategyKind) -> Result<&StrategyInput> {
        self.inputs.get(&kind).ok_or(Error::NotInExchange {
            kind,
            slot: Slot::Input,
        })
    }

    /// Typed input for the kind `T` belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInExchange`] if nothing was stored for that kind.
    pub fn read_input<T: Payload<StrategyInput>>(&self) -> Result<&T> {
        self.input(T::KIND).and_then(|input| {
            T::from_ref(input).ok_or(Error::NotInExchange {
                kind: T::KIND,
                slot: Slot::Input,
            })
        })
    }

    /// Store `output` under its own kind.
    #[must_use]
    pub fn with_output(mut self, output: StrategyOutput) -> Self {
        self.outputs.insert(output.kind(), output);
        self
    }

    /// Output stored under `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInExchange`] if nothing was stored for `kind`.
    pub fn output(&self, kind: StrategyKind) -> Result<&StrategyOutput> {
        self.outputs.get(&kind).ok_or(Error::NotInExchange {
            kind,
            slot: Slot::Output,
        })
    }

    /// Typed output for the kind `T` belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInExchange`] if nothing was stored for that kind.
    pub fn read_output<T: Payload<StrategyOutput>>(&self) -> Result<&T> {
        self.output(T::KIND).and_then(|output| {
            T::from_ref(output).ok_or(Error::NotInExchange {
                kind: T::KIND,
                slot: Slot::Output,
            })
        })
    }

    /// Name the session a revocation targets.
    #[must_use]
    pub fn with_session(mut self, id: Uuid) -> Self {
        self.session = Some(id);
        self
    }

    #[must_use]
    pub fn session(&self) -> Option<Uuid> {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{
        CredentialsInput, CredentialsOutput, PersonalNumberInput, PersonalNumberOutput,
    };

    fn credentials_output() -> StrategyOutput {
        StrategyOutput::Credentials(CredentialsOutput {
            email: "a@b.com".to_string(),
        })
    }

    #[test]
    fn typed_input_round_trip() -> Result<()> {
        let exchange = Exchange::new().with_input(StrategyInput::Credentials(CredentialsInput {
            email: "a@b.com".to_string(),
            password: "Passw0rd".into(),
        }));
        let input = exchange.read_input::<CredentialsInput>()?;
        assert_eq!(input.email, "a@b.com");
        assert_eq!(input.password.expose(), "Passw0rd");
        Ok(())
    }

    #[test]
    fn wrong_kind_output_is_missing_not_zero() {
        let exchange = Exchange::new().with_output(credentials_output());
        let result = exchange.read_output::<PersonalNumberOutput>();
        assert!(matches!(
            result,
            Err(Error::NotInExchange {
                kind: StrategyKind::PersonalNumber,
                slot: Slot::Output
            })
        ));
        assert!(matches!(
            exchange.output(StrategyKind::NoOp),
            Err(Error::NotInExchange { .. })
        ));
    }

    #[test]
    fn missing_input_is_an_input_error() {
        let exchange = Exchange::new();
        let err = match exchange.read_input::<PersonalNumberInput>() {
            Err(err) => err,
            Ok(_) => unreachable!("empty exchange returned input"),
        };
        assert_eq!(err.code(), crate::error::Code::InvalidArgument);
        assert_eq!(err.to_string(), "personal_number input not found in exchange");
    }

    #[test]
    fn namespaces_do_not_collide() -> Result<()> {
        let exchange = Exchange::new()
            .with_output(credentials_output())
            .with_output(StrategyOutput::PersonalNumber(PersonalNumberOutput {
                number: 4_865_998_752_658_465,
            }));
        assert_eq!(exchange.read_output::<CredentialsOutput>()?.email, "a@b.com");
        assert_eq!(
            exchange.read_output::<PersonalNumberOutput>()?.number,
            4_865_998_752_658_465
        );
        Ok(())
    }

    #[test]
    fn session_slot() {
        let id = Uuid::new_v4();
        assert_eq!(Exchange::new().session(), None);
        assert_eq!(Exchange::new().with_session(id).session(), Some(id));
    }
}
