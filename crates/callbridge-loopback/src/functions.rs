use core::{fmt, str::FromStr};

use callbridge::FunctionRef;

/// Final result is the arguments, unchanged.
pub const ECHO: FunctionRef = FunctionRef::new(1);
/// Final result is the arguments, byte-reversed.
pub const REVERSE: FunctionRef = FunctionRef::new(2);
/// Streams one chunk per whitespace-separated word; final result is the word
/// count as decimal text.
pub const SPLIT: FunctionRef = FunctionRef::new(3);
/// Reports a fixed number of ticks, then echoes the arguments.
pub const TICK: FunctionRef = FunctionRef::new(4);
/// Reports the arguments as an error message.
pub const FAIL: FunctionRef = FunctionRef::new(5);
/// Accepts the call and never calls back.
pub const SILENT: FunctionRef = FunctionRef::new(6);

/// The functions the loopback library exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Echo,
    Reverse,
    Split,
    Tick,
    Fail,
    Silent,
}

impl Function {
    pub const ALL: [Self; 6] = [
        Self::Echo,
        Self::Reverse,
        Self::Split,
        Self::Tick,
        Self::Fail,
        Self::Silent,
    ];

    pub const fn function_ref(self) -> FunctionRef {
        match self {
            Self::Echo => ECHO,
            Self::Reverse => REVERSE,
            Self::Split => SPLIT,
            Self::Tick => TICK,
            Self::Fail => FAIL,
            Self::Silent => SILENT,
        }
    }

    pub fn from_ref(function: FunctionRef) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.function_ref() == function)
    }

    /// Streaming functions must be started with `start_stream`, all others
    /// with `start`.
    pub const fn is_streaming(self) -> bool {
        matches!(self, Self::Split)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Reverse => "reverse",
            Self::Split => "split",
            Self::Tick => "tick",
            Self::Fail => "fail",
            Self::Silent => "silent",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Function {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|f| f.name()).collect();
                format!("unknown function `{s}` (expected one of: {})", names.join(", "))
            })
    }
}

/// Whitespace-separated, non-empty words of `args`.
pub(crate) fn words(args: &[u8]) -> impl Iterator<Item = &[u8]> {
    args.split(u8::is_ascii_whitespace)
        .filter(|word| !word.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_round_trip_through_lookup() {
        for function in Function::ALL {
            assert_eq!(Function::from_ref(function.function_ref()), Some(function));
        }
        assert_eq!(Function::from_ref(FunctionRef::new(0)), None);
        assert_eq!(Function::from_ref(FunctionRef::new(99)), None);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Split".parse::<Function>(), Ok(Function::Split));
        assert!("nope".parse::<Function>().unwrap_err().contains("silent"));
    }

    #[test]
    fn words_skip_runs_of_whitespace() {
        let got: Vec<_> = words(b"  alpha \t beta\ngamma  ").collect();
        assert_eq!(got, vec![&b"alpha"[..], &b"beta"[..], &b"gamma"[..]]);
        assert_eq!(words(b"   ").count(), 0);
    }
}
