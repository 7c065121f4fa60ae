use core::time::Duration;

use anyhow::bail;
use callbridge_loopback::{Function, LoopbackOptions};
use clap::Parser;

/// Runtime configuration for the `callbridge-loopback` binary.
///
/// Every value is parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults that finish in well under a second.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "callbridge-loopback",
    version,
    about = "Drives one bridged call through the in-process loopback library"
)]
pub struct CliArgs {
    /// Number of worker threads the loopback library runs callbacks from.
    ///
    /// Environment variable: `LOOPBACK_WORKERS`
    #[arg(long, env = "LOOPBACK_WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Function to invoke: echo, reverse, split, tick, fail or silent.
    ///
    /// `split` is a streaming function and prints each chunk as it arrives.
    ///
    /// Environment variable: `LOOPBACK_FUNCTION`
    #[arg(long, env = "LOOPBACK_FUNCTION", default_value_t = Function::Echo)]
    pub function: Function,

    /// Argument bytes passed to the function, as UTF-8 text.
    ///
    /// Environment variable: `LOOPBACK_INPUT`
    #[arg(long, env = "LOOPBACK_INPUT", default_value_t = String::from("hello from the loopback library"))]
    pub input: String,

    /// Cancel the call if it has not completed after this many milliseconds.
    ///
    /// Unset means wait until the call completes or Ctrl+C is pressed.
    ///
    /// Environment variable: `LOOPBACK_TIMEOUT_MS`
    #[arg(long, env = "LOOPBACK_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Tick callbacks reported by the `tick` function.
    ///
    /// Environment variable: `LOOPBACK_TICKS`
    #[arg(long, env = "LOOPBACK_TICKS", default_value_t = 3)]
    pub ticks: usize,

    /// Pause before every step of a job, in milliseconds.
    ///
    /// Environment variable: `LOOPBACK_STEP_DELAY_MS`
    #[arg(long, env = "LOOPBACK_STEP_DELAY_MS", default_value_t = 50)]
    pub step_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub options: LoopbackOptions,
    pub function: Function,
    pub input: String,
    pub timeout: Option<Duration>,
}

impl TryFrom<CliArgs> for LoopbackConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.workers == 0 {
            bail!("LOOPBACK_WORKERS must be greater than 0");
        }

        let timeout = match args.timeout_ms {
            Some(0) => bail!("LOOPBACK_TIMEOUT_MS must be greater than 0 when set"),
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };

        Ok(Self {
            options: LoopbackOptions {
                workers: args.workers,
                ticks: args.ticks,
                step_delay: Duration::from_millis(args.step_delay_ms),
            },
            function: args.function,
            input: args.input,
            timeout,
        })
    }
}
