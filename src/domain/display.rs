//! What the operator sees after each scan

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Pending,
    Success,
    Failure,
    Error,
}

/// Derived display payload, never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayPayload {
    pub tone: Tone,
    pub headline: String,
    pub body: String,
    /// Formatted exactly as the ledger sent it (e.g. "5")
    pub remaining_balance: Option<String>,
}

impl DisplayPayload {
    pub fn new(tone: Tone, headline: impl Into<String>, body: impl Into<String>) -> Self {
        Self { tone, headline: headline.into(), body: body.into(), remaining_balance: None }
    }

    pub fn with_balance(mut self, balance: Option<String>) -> Self {
        self.remaining_balance = balance;
        self
    }
}
