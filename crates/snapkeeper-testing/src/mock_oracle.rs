//! # Scripted Change Oracle

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use snapkeeper_core::{ChangeOracle, OracleError};

#[derive(Debug, Clone)]
enum Answer {
    Changed(bool),
    Unavailable(String),
}

/// Change oracle answering from a switchable script.
#[derive(Debug)]
pub struct ScriptedOracle {
    answer: Mutex<Answer>,
    asked: Mutex<Vec<DateTime<Utc>>>,
}

impl ScriptedOracle {
    fn with_answer(answer: Answer) -> Self {
        Self {
            answer: Mutex::new(answer),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Always reports a change
    pub fn changed() -> Self {
        Self::with_answer(Answer::Changed(true))
    }

    /// Never reports a change
    pub fn unchanged() -> Self {
        Self::with_answer(Answer::Changed(false))
    }

    /// Fails every query with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_answer(Answer::Unavailable(message.into()))
    }

    pub fn set_changed(&self, changed: bool) {
        *self.answer.lock().unwrap() = Answer::Changed(changed);
    }

    /// Baselines the oracle was asked about, in call order
    pub fn asked(&self) -> Vec<DateTime<Utc>> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeOracle for ScriptedOracle {
    async fn exists_changed_after(&self, timestamp: DateTime<Utc>) -> Result<bool, OracleError> {
        self.asked.lock().unwrap().push(timestamp);
        match self.answer.lock().unwrap().clone() {
            Answer::Changed(changed) => Ok(changed),
            Answer::Unavailable(message) => Err(OracleError::Unavailable(message)),
        }
    }
}
