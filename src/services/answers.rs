//! Contract with the component that collects raw answers from a user.
//!
//! Interactive prompting lives outside this crate. What the crate needs is an
//! [`AnswerSource`] that, for a list of [`Question`]s:
//! - fails with [`PromptError::MissingAnswer`] when a question gets no answer,
//! - runs each question's validator and fails with [`PromptError::Rejected`]
//!   when it refuses the answer,
//! - reuses answers already present in the prior answers unless the question
//!   is marked [`ask_again`](Question::ask_again).
//!
//! [`ScriptedAnswers`] implements the contract from a fixed set of answers,
//! for tests and non-interactive runs. The helpers at the bottom of this
//! module turn validated answers into document entities.

use crate::models::{Collection, ConfigFileFormat, Project};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

/// Answers keyed by question name, in the order they were given
pub type Answers = IndexMap<String, Value>;

/// Accepts an answer or explains why not
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("Invalid key regex"));

/// Whether `key` is usable as an entry name in a document collection
pub fn is_valid_key(key: &str) -> bool {
    KEY_PATTERN.is_match(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    Text,
    Confirm,
    List,
}

impl AnswerKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            AnswerKind::Text => value.is_string(),
            AnswerKind::Confirm => value.is_boolean(),
            AnswerKind::List => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("No answer was provided for question \"{0}\"")]
    MissingAnswer(String),

    #[error("Answer to \"{name}\" was rejected: {reason}")]
    Rejected { name: String, reason: String },

    #[error("Answer to \"{name}\" is not a {expected:?} value")]
    WrongKind { name: String, expected: AnswerKind },
}

/// One question put to the answer source
#[derive(Clone)]
pub struct Question {
    pub name: String,
    pub kind: AnswerKind,
    /// Suggested answer an interactive source may pre-fill
    pub default: Value,
    /// Ask even if the prior answers already hold this name
    pub ask_again: bool,
    validator: Option<Validator>,
}

impl Question {
    pub fn new(name: impl Into<String>, kind: AnswerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Value::Null,
            ask_again: false,
            validator: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn asked_again(mut self) -> Self {
        self.ask_again = true;
        self
    }

    /// Check `answer` against the declared kind and validator.
    pub fn validate(&self, answer: &Value) -> Result<(), PromptError> {
        if !self.kind.accepts(answer) {
            return Err(PromptError::WrongKind {
                name: self.name.clone(),
                expected: self.kind,
            });
        }

        match &self.validator {
            Some(validator) => validator(answer).map_err(|reason| PromptError::Rejected {
                name: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Question")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("ask_again", &self.ask_again)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Source of raw answers
pub trait AnswerSource {
    /// Answer `questions`, starting from `prior`.
    ///
    /// The result holds every prior answer plus one answer per question.
    fn prompt(&mut self, questions: &[Question], prior: &Answers) -> Result<Answers, PromptError>;
}

/// [`AnswerSource`] replaying a fixed set of answers
#[derive(Debug, Clone, Default)]
pub struct ScriptedAnswers {
    script: Answers,
    asked: Vec<String>,
}

impl ScriptedAnswers {
    pub fn new(script: Answers) -> Self {
        Self {
            script,
            asked: Vec::new(),
        }
    }

    /// Names of the questions actually asked, across all prompts
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ScriptedAnswers {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl AnswerSource for ScriptedAnswers {
    fn prompt(&mut self, questions: &[Question], prior: &Answers) -> Result<Answers, PromptError> {
        let mut answers = prior.clone();

        for question in questions {
            if prior.contains_key(&question.name) && !question.ask_again {
                continue;
            }

            self.asked.push(question.name.clone());
            let answer = self
                .script
                .get(&question.name)
                .cloned()
                .ok_or_else(|| PromptError::MissingAnswer(question.name.clone()))?;

            question.validate(&answer)?;
            answers.insert(question.name.clone(), answer);
        }

        Ok(answers)
    }
}

/// A question whose answer must name an existing entry of `collection`.
pub fn key_question(
    name: &str,
    collection: Collection,
    document: &ConfigFileFormat,
) -> Question {
    let known: Vec<String> = document
        .keys(collection)
        .into_iter()
        .map(str::to_string)
        .collect();
    let default = known.first().cloned().map(Value::String).unwrap_or_default();

    Question::new(name, AnswerKind::Text)
        .with_default(default)
        .with_validator(move |answer| {
            let key = answer.as_str().unwrap_or_default();
            if known.iter().any(|existing| existing == key) {
                Ok(())
            } else {
                Err(format!("\"{key}\" is not one of the {collection} keys"))
            }
        })
}

/// Questions for a new project, validated against `document`.
pub fn project_questions(document: &ConfigFileFormat) -> Vec<Question> {
    vec![
        key_question("integrationKey", Collection::Integrations, document),
        key_question("mozconfigKey", Collection::Mozconfigs, document),
        key_question("appDirKey", Collection::Sources, document),
    ]
}

/// Build a project from answers to [`project_questions`].
pub fn project_from_answers(answers: &Answers) -> Result<Project, PromptError> {
    let text = |name: &str| -> Result<String, PromptError> {
        match answers.get(name) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(_) => Err(PromptError::WrongKind {
                name: name.to_string(),
                expected: AnswerKind::Text,
            }),
            None => Err(PromptError::MissingAnswer(name.to_string())),
        }
    };

    Ok(Project::new(
        text("integrationKey")?,
        text("mozconfigKey")?,
        text("appDirKey")?,
    ))
}
