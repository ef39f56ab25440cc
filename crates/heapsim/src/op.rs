use std::{num::ParseIntError, str::FromStr};

use snafu::{OptionExt as _, ResultExt as _, Snafu};

/// One step of a simulation, written on the command line as:
///
/// - `alloc=SIZE`
/// - `zalloc=COUNT,SIZE`
/// - `free=ID`
/// - `resize=ID,SIZE`
/// - `dump`
/// - `stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Alloc(usize),
    AllocZeroed(usize, usize),
    Free(usize),
    Resize(usize, usize),
    Dump,
    Stats,
}

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum ParseOpError {
    #[snafu(display("unknown operation `{name}`"))]
    UnknownOp { name: String },
    #[snafu(display("operation `{name}` expects {expected}"))]
    MissingArgument { name: String, expected: &'static str },
    #[snafu(display("invalid number `{value}`"))]
    InvalidNumber {
        value: String,
        source: ParseIntError,
    },
}

impl FromStr for Op {
    type Err = ParseOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        #[cfg_attr(not(test), expect(clippy::wildcard_imports))]
        use self::parse_op_error::*;

        let (name, arg) = match s.split_once('=') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let single = || -> Result<usize, ParseOpError> {
            let arg = arg.context(MissingArgumentSnafu {
                name,
                expected: "a number",
            })?;
            number(arg)
        };
        let pair = || -> Result<(usize, usize), ParseOpError> {
            let (first, second) = arg.and_then(|arg| arg.split_once(',')).context(
                MissingArgumentSnafu {
                    name,
                    expected: "two comma separated numbers",
                },
            )?;
            Ok((number(first)?, number(second)?))
        };

        let op = match name {
            "alloc" => Self::Alloc(single()?),
            "zalloc" => {
                let (count, size) = pair()?;
                Self::AllocZeroed(count, size)
            }
            "free" => Self::Free(single()?),
            "resize" => {
                let (id, size) = pair()?;
                Self::Resize(id, size)
            }
            "dump" => Self::Dump,
            "stats" => Self::Stats,
            _ => return UnknownOpSnafu { name }.fail(),
        };
        Ok(op)
    }
}

fn number(value: &str) -> Result<usize, ParseOpError> {
    let value = value.trim();
    value
        .parse()
        .context(parse_op_error::InvalidNumberSnafu { value })
}
