use thiserror::Error;

/// Fatal errors. Any of these escaping a processing function aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    /// The name is not a calculable anywhere in the fallback chain and the
    /// bound record has no such field.
    #[error("variation `{variation}` has no calculable or field named `{attribute}`")]
    AttributeLookup { variation: String, attribute: String },

    #[error("variation `{variation}` has no record bound")]
    Unbound { variation: String },

    /// Raised by user code when a calculable cannot produce a meaningful value.
    #[error("calculation error: {0}")]
    Calculation(String),

    #[error("fallback cycle: {}", chain.join(" -> "))]
    FallbackCycle { chain: Vec<String> },

    #[error("unknown variation id {0}")]
    UnknownVariation(usize),

    #[error("calculable `{calculable}` of variation `{variation}` depends on itself")]
    Reentrant { variation: String, calculable: String },

    #[error("value decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("variation `{variation}` hit cut `{cut}` outside its processing function")]
    UnexpectedSkip { variation: String, cut: String },

    #[error("record source error: {0}")]
    Source(String),
}

impl Error {
    pub fn calculation(msg: impl Into<String>) -> Self {
        Error::Calculation(msg.into())
    }
}

/// Why processing of a record stopped early for one variation.
#[derive(Debug)]
pub enum Halt {
    /// The record failed the named cut. Expected; not an error.
    Skip { cut: String },
    Fatal(Error),
}

impl Halt {
    pub fn skip(cut: impl Into<String>) -> Self {
        Halt::Skip { cut: cut.into() }
    }

    /// Turns a halt seen outside the process phase into a fatal error.
    pub fn into_error(self, variation: &str) -> Error {
        match self {
            Halt::Skip { cut } => Error::UnexpectedSkip {
                variation: variation.to_string(),
                cut,
            },
            Halt::Fatal(e) => e,
        }
    }
}

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Halt::Fatal(e)
    }
}

impl From<serde_json::Error> for Halt {
    fn from(e: serde_json::Error) -> Self {
        Halt::Fatal(Error::Decode(e))
    }
}

/// Outcome of a calculable body that did not produce a value.
#[derive(Debug)]
pub enum Signal {
    /// Resolve this calculable through the fallback instead.
    Defer,
    Halt(Halt),
}

impl From<Halt> for Signal {
    fn from(h: Halt) -> Self {
        Signal::Halt(h)
    }
}

impl From<Error> for Signal {
    fn from(e: Error) -> Self {
        Signal::Halt(Halt::Fatal(e))
    }
}

impl From<serde_json::Error> for Signal {
    fn from(e: serde_json::Error) -> Self {
        Signal::Halt(Halt::Fatal(Error::Decode(e)))
    }
}

// Type alias for results that use `Error` as the error type
pub type Result<T> = std::result::Result<T, Error>;
