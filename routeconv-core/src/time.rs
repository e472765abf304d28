use core::fmt;
use logos::{Lexer, Logos};
use std::{
    ops::{Add, AddAssign},
    str::FromStr,
    time,
};
use thiserror::Error;

/// An instant on the virtual clock of the simulation.
///
/// The clock starts at [`SimTime::ZERO`] when the simulation starts and is
/// only ever advanced by the [`Scheduler`]. It is independent of wall-clock
/// time and precise to the nanosecond, so adding the same polling interval
/// over and over never accumulates rounding errors.
///
/// ```
/// # use routeconv_core::time::SimTime;
/// # use std::time::Duration;
/// let t = SimTime::from_secs(100) + Duration::from_millis(5_300);
/// assert_eq!(t.to_string(), "105.3s");
/// assert_eq!("105.3s".parse::<SimTime>().unwrap(), t);
/// ```
///
/// [`Scheduler`]: crate::scheduler::Scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(time::Duration);

impl SimTime {
    /// the beginning of the simulation
    pub const ZERO: Self = Self(time::Duration::ZERO);

    /// create the instant that is `elapsed` after the start of the simulation
    #[inline]
    pub const fn new(elapsed: time::Duration) -> Self {
        Self(elapsed)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self(time::Duration::from_secs(secs))
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(time::Duration::from_millis(millis))
    }

    /// # Panics
    ///
    /// like [`Duration::from_secs_f64`], panics if `secs` is negative,
    /// not finite or overflows.
    ///
    /// [`Duration::from_secs_f64`]: std::time::Duration::from_secs_f64
    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(time::Duration::from_secs_f64(secs))
    }

    /// time elapsed since the start of the simulation
    #[inline]
    pub const fn elapsed(self) -> time::Duration {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }

    /// the duration from `earlier` to `self`, or `None` if `earlier` is
    /// after `self`.
    #[inline]
    pub fn checked_duration_since(self, earlier: Self) -> Option<time::Duration> {
        self.0.checked_sub(earlier.0)
    }

    /// the duration from `earlier` to `self`, zero if `earlier` is after `self`.
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> time::Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<time::Duration> for SimTime {
    type Output = SimTime;
    fn add(self, rhs: time::Duration) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<time::Duration> for SimTime {
    fn add_assign(&mut self, rhs: time::Duration) {
        self.0 += rhs;
    }
}

impl From<time::Duration> for SimTime {
    fn from(value: time::Duration) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Duration(self.0).fmt(f)
    }
}

impl FromStr for SimTime {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Duration(elapsed) = s.parse()?;
        Ok(Self(elapsed))
    }
}

/// A human readable [`std::time::Duration`].
///
/// Parses sequences of `<number><unit>` such as `"100ms"`, `"0.1s"` or
/// `"1m 40s"` (the parts are summed) and displays like the standard
/// [`Debug`] formatting of a duration (`"100ms"`, `"105.3s"`).
///
/// ```
/// # use routeconv_core::time::Duration;
/// let duration: Duration = "1m 40s".parse().unwrap();
/// assert_eq!(duration.into_duration().as_secs(), 100);
/// assert_eq!(duration.to_string(), "100s");
/// ```
///
/// [`Debug`]: std::fmt::Debug
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(time::Duration);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("Failed to parse `{input}': unexpected token")]
    InvalidToken { input: String },
    #[error("Expecting duration to start with a number. Cannot parse `{input}'")]
    ExpectingNumber { input: String },
    #[error("Failed to parse `{input}', expecting a measure after the number.")]
    ExpectingMeasure { input: String },
    #[error("Failed to parse `{input}': invalid number `{number}'")]
    InvalidNumber { input: String, number: String },
    #[error("Failed to parse `{input}': empty duration")]
    Empty { input: String },
}

impl Duration {
    pub const fn new(dur: time::Duration) -> Self {
        Self(dur)
    }

    #[inline]
    pub fn into_duration(self) -> time::Duration {
        self.0
    }
}

impl From<Duration> for time::Duration {
    fn from(value: Duration) -> Self {
        value.into_duration()
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <time::Duration as fmt::Debug>::fmt(&self.0, f)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <time::Duration as fmt::Debug>::fmt(&self.0, f)
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::new(s);

        let mut total = time::Duration::ZERO;
        let mut parts = 0;

        while let Some(next) = lex.next() {
            let number: Token = next.map_err(|()| DurationParseError::InvalidToken {
                input: s.to_owned(),
            })?;

            if number != Token::Value {
                return Err(DurationParseError::ExpectingNumber {
                    input: s.to_owned(),
                });
            }
            let value = lex.slice();

            let Some(Ok(measure)) = lex.next() else {
                return Err(DurationParseError::ExpectingMeasure {
                    input: s.to_owned(),
                });
            };
            let nanos_per_unit: u64 = match measure {
                Token::NanoSeconds => 1,
                Token::MicroSeconds => 1_000,
                Token::MilliSeconds => 1_000_000,
                Token::Seconds => 1_000_000_000,
                Token::Minutes => 60_000_000_000,
                Token::Value => {
                    return Err(DurationParseError::ExpectingMeasure {
                        input: s.to_owned(),
                    });
                }
            };

            total += scale(value, nanos_per_unit).ok_or_else(|| {
                DurationParseError::InvalidNumber {
                    input: s.to_owned(),
                    number: value.to_owned(),
                }
            })?;
            parts += 1;
        }

        if parts == 0 {
            return Err(DurationParseError::Empty {
                input: s.to_owned(),
            });
        }

        Ok(Self(total))
    }
}

/// `value` units of `nanos_per_unit` nanoseconds.
///
/// Integers are scaled exactly; decimals go through the fractional digits
/// so that `0.1s` is exactly `100ms`.
fn scale(value: &str, nanos_per_unit: u64) -> Option<time::Duration> {
    let (integer, fraction) = value.split_once('.').unwrap_or((value, ""));
    let integer: u64 = integer.parse().ok()?;

    let mut nanos = integer.checked_mul(nanos_per_unit)?;

    let mut unit = nanos_per_unit;
    for digit in fraction.chars() {
        unit /= 10;
        if unit == 0 {
            // sub-nanosecond digits are truncated
            break;
        }
        let digit = u64::from(digit.to_digit(10)?);
        nanos = nanos.checked_add(digit * unit)?;
    }

    Some(time::Duration::from_nanos(nanos))
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|μs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Value,
}
