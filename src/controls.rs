//! Stream policy and connection controls shared by the binaries.

use crate::aggregator::{MalformedPolicy, PipelinePolicy, RecommendationPolicy};
use crate::client::{AnalysisRequest, InputKind, SessionContext};
use crate::error::RequestError;
use clap::{Parser, ValueEnum};
use std::time::Duration;

/// Tunable knobs that bound stream behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamControls {
    policy: PipelinePolicy,
    read_timeout: Option<Duration>,
    connect_timeout: Duration,
}

impl StreamControls {
    /// Constructs a new set of stream controls.
    pub fn new(
        policy: PipelinePolicy,
        read_timeout: Option<Duration>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            read_timeout,
            connect_timeout,
        }
    }

    /// Malformed-payload and recommendation policy.
    pub fn policy(&self) -> PipelinePolicy {
        self.policy
    }

    /// Deadline for the whole stream, if any.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Time allowed for establishing the connection.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for StreamControls {
    fn default() -> Self {
        Self {
            policy: PipelinePolicy::default(),
            read_timeout: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Command-line interface for submitting an analysis.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "product_stream",
    about = "Submit a product query and print ranked results as they stream in"
)]
pub struct Cli {
    /// Product URL or free-text description
    pub query: String,

    /// Analysis service base URL
    #[arg(
        long,
        env = "PRODUCT_STREAM_ENDPOINT",
        default_value = "http://localhost:8080"
    )]
    pub endpoint: String,

    /// Bearer token for the analysis service
    #[arg(long, env = "PRODUCT_STREAM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Force the input kind instead of inferring it from the query
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// Seconds before the stream is cancelled (0 = no deadline)
    #[arg(long, env = "PRODUCT_STREAM_TIMEOUT", default_value_t = 0)]
    pub timeout_secs: u64,

    /// Seconds allowed for connecting to the service
    #[arg(long, env = "PRODUCT_STREAM_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// What to do with records that fail to parse
    #[arg(long, value_enum, default_value = "skip")]
    pub malformed: MalformedArg,

    /// Which records are recommended when the service does not say
    #[arg(long, value_enum, default_value = "first-record")]
    pub recommend: RecommendArg,

    /// Print every snapshot as a JSON line instead of text
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Log output format
    #[arg(long, env = "PRODUCT_STREAM_LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Converts the parsed CLI into `StreamControls`.
    pub fn build_controls(&self) -> StreamControls {
        StreamControls::new(
            PipelinePolicy {
                malformed: self.malformed.into(),
                recommendation: self.recommend.into(),
            },
            (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            Duration::from_secs(self.connect_timeout_secs),
        )
    }

    /// Builds the request context from the endpoint and token.
    pub fn build_context(&self) -> Result<SessionContext, RequestError> {
        SessionContext::new(&self.endpoint, self.token.clone())
    }

    /// Validates the query into a request.
    pub fn build_request(&self) -> Result<AnalysisRequest, RequestError> {
        match self.kind {
            Some(kind) => AnalysisRequest::with_kind(self.query.clone(), kind.into()),
            None => AnalysisRequest::new(self.query.clone()),
        }
    }
}

/// Input kind override.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    /// Treat the query as a product link.
    Url,
    /// Treat the query as a description.
    Description,
}

impl From<KindArg> for InputKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Url => InputKind::Url,
            KindArg::Description => InputKind::Description,
        }
    }
}

/// Malformed-payload handling.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MalformedArg {
    /// Log and continue (default).
    Skip,
    /// Fail the stream.
    Abort,
}

impl From<MalformedArg> for MalformedPolicy {
    fn from(arg: MalformedArg) -> Self {
        match arg {
            MalformedArg::Skip => MalformedPolicy::Skip,
            MalformedArg::Abort => MalformedPolicy::Abort,
        }
    }
}

/// Default recommendation rule.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RecommendArg {
    /// First parsed record is recommended unless it says otherwise (default).
    FirstRecord,
    /// Only records flagged by the service are recommended.
    ExplicitOnly,
}

impl From<RecommendArg> for RecommendationPolicy {
    fn from(arg: RecommendArg) -> Self {
        match arg {
            RecommendArg::FirstRecord => RecommendationPolicy::FirstRecord,
            RecommendArg::ExplicitOnly => RecommendationPolicy::ExplicitOnly,
        }
    }
}

/// Log formatter selection.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}
