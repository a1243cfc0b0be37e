//! Response validation for request/response dialects
//!
//! Requests and responses are `NAME:payload` messages. A checker looks at
//! one command and its response (both split on `:`) and either claims
//! the pair or passes it on; the first checker that claims it decides.

/// Outcome of checking one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// Response answers the command; carries the value with the command prefix removed
    Valid(String),
    /// Checker does not handle this command
    NotMine,
    /// Response is for this command but the value is malformed
    BadValue,
    /// Device rejected the command
    BadCommand,
}

impl CheckResult {
    /// Numeric code: 1 valid, 0 not mine, -1 bad value, -2 bad command
    pub fn code(&self) -> i32 {
        match self {
            CheckResult::Valid(_) => 1,
            CheckResult::NotMine => 0,
            CheckResult::BadValue => -1,
            CheckResult::BadCommand => -2,
        }
    }

    /// Whether the response was accepted
    pub fn is_valid(&self) -> bool {
        matches!(self, CheckResult::Valid(_))
    }
}

/// Validates one response against its command
pub trait ResponseChecker: Send + Sync {
    /// `command` and `response` are split on `:`
    fn check(&self, command: &[&str], response: &[&str]) -> CheckResult;
}

impl<F> ResponseChecker for F
where
    F: Fn(&[&str], &[&str]) -> CheckResult + Send + Sync,
{
    fn check(&self, command: &[&str], response: &[&str]) -> CheckResult {
        self(command, response)
    }
}

/// Ordered list of checkers, first claim wins
#[derive(Default)]
pub struct CheckerChain {
    checkers: Vec<Box<dyn ResponseChecker>>,
}

impl CheckerChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a checker
    pub fn with(mut self, checker: impl ResponseChecker + 'static) -> Self {
        self.checkers.push(Box::new(checker));
        self
    }

    /// Number of checkers
    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

impl ResponseChecker for CheckerChain {
    fn check(&self, command: &[&str], response: &[&str]) -> CheckResult {
        self.checkers
            .iter()
            .map(|checker| checker.check(command, response))
            .find(|result| *result != CheckResult::NotMine)
            .unwrap_or(CheckResult::NotMine)
    }
}

impl std::fmt::Debug for CheckerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckerChain")
            .field("checkers", &self.checkers.len())
            .finish()
    }
}

/// Split a `NAME:payload` message
pub fn split_message(message: &str) -> Vec<&str> {
    message.split(':').collect()
}

/// Match the responses of a combined request against its commands.
///
/// The response datagram holds one comma separated response per command.
/// Returns the accepted values in command order, or the first rejection.
pub fn validate_responses(
    commands: &[String],
    datagram: &str,
    checker: &dyn ResponseChecker,
) -> std::result::Result<Vec<String>, CheckResult> {
    let responses: Vec<&str> = datagram.split(',').collect();
    if responses.len() != commands.len() {
        return Err(CheckResult::NotMine);
    }

    let mut values = Vec::with_capacity(commands.len());
    for (command, response) in commands.iter().zip(responses) {
        match checker.check(&split_message(command), &split_message(response)) {
            CheckResult::Valid(value) => values.push(value),
            rejected => return Err(rejected),
        }
    }
    Ok(values)
}
