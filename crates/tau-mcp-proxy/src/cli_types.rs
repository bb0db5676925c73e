use clap::ValueEnum;
use tau_summarizer::SummarizerFailureMode;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliSummarizerBackend {
    Anthropic,
    Command,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliSummarizerFailureMode {
    Error,
    Passthrough,
}

impl From<CliSummarizerFailureMode> for SummarizerFailureMode {
    fn from(value: CliSummarizerFailureMode) -> Self {
        match value {
            CliSummarizerFailureMode::Error => SummarizerFailureMode::Error,
            CliSummarizerFailureMode::Passthrough => SummarizerFailureMode::Passthrough,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LevelFilter {
    fn from(value: CliLogLevel) -> Self {
        match value {
            CliLogLevel::Off => LevelFilter::OFF,
            CliLogLevel::Error => LevelFilter::ERROR,
            CliLogLevel::Warn => LevelFilter::WARN,
            CliLogLevel::Info => LevelFilter::INFO,
            CliLogLevel::Debug => LevelFilter::DEBUG,
            CliLogLevel::Trace => LevelFilter::TRACE,
        }
    }
}
