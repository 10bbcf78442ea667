//! Pipeline graph
//!
//! Fixed topology:
//!
//! ```text
//! Entry -> Classify -> [Portfolio] -> (News -> Sentiment || Fundamentals)
//!       -> Merge -> Synthesize -> Route -> Advice | Strategy | halt
//! ```
//!
//! An `invalid` discriminator halts right after classification with a
//! "not applicable" outcome; no enrichment or generation work is done.

use crate::collaborators::{Collaborators, Generator};
use crate::config::PipelineSettings;
use crate::error::{PipelineError, Result};
use crate::executor::{Backend, Branch, BranchExecutor, BranchKind, BranchResult};
use crate::merge::merge;
use crate::models::{InvestorProfile, Stage};
use crate::nodes::{
    invoke, symbol_list, AdviceNode, ClassifyNode, FundamentalsNode, NewsNode, Node,
    PortfolioNode, SentimentNode, StrategyNode, SynthesisNode,
};
use crate::router::{route_state, Route};
use crate::state::{is_valid_symbol, normalize_symbols, AnalysisState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::{Builder, Handle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Longest accepted query, in characters.
pub const MAX_QUERY_CHARS: usize = 4000;

// ===== Request / Outcome =====

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub query: String,
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    #[serde(default)]
    pub profile: Option<InvestorProfile>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = Some(symbols.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_profile(mut self, profile: InvestorProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub route: Route,
    pub state: AnalysisState,
    /// Human readable stage transitions
    pub trace: Vec<String>,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    /// False when the request was not about investing.
    pub fn is_applicable(&self) -> bool {
        self.route != Route::NotApplicable
    }
}

/// Entry validation. Returns the normalized symbol hints.
pub fn validate(request: &RunRequest) -> Result<Vec<String>> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(PipelineError::Validation("query must not be empty".to_string()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(PipelineError::Validation(format!(
            "query exceeds {} characters",
            MAX_QUERY_CHARS
        )));
    }

    let Some(hints) = &request.symbols else {
        return Ok(Vec::new());
    };
    if hints.is_empty() {
        return Err(PipelineError::Validation(
            "symbol list was supplied but is empty".to_string(),
        ));
    }
    if let Some(bad) = hints.iter().find(|s| !is_valid_symbol(s)) {
        return Err(PipelineError::Validation(format!("malformed symbol '{}'", bad)));
    }
    Ok(normalize_symbols(hints))
}

// ===== Pipeline =====

struct RunContext {
    run_id: Uuid,
    started: Instant,
    state: AnalysisState,
    trace: Vec<String>,
}

impl RunContext {
    fn outcome(self, route: Route) -> RunOutcome {
        RunOutcome {
            run_id: self.run_id,
            route,
            state: self.state,
            trace: self.trace,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

enum Prepared {
    Halted(RunOutcome),
    Ready(RunContext),
}

pub struct Pipeline {
    settings: PipelineSettings,
    classify: Arc<dyn Node>,
    portfolio: Arc<dyn Node>,
    executor: BranchExecutor,
    synthesis: Arc<dyn Node>,
    advice: Arc<dyn Node>,
    strategy: Arc<dyn Node>,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Result<Self> {
        if settings.news_limit == 0 {
            return Err(PipelineError::Config("news limit must be at least 1".to_string()));
        }

        let timeout = settings.collaborator_timeout;
        let generator = Generator::new(Arc::clone(&collaborators.model), timeout);

        let news_branch = Branch::new(
            BranchKind::News,
            vec![
                Arc::new(NewsNode::new(
                    Arc::clone(&collaborators.news),
                    settings.news_lookback_days,
                    settings.news_limit,
                    timeout,
                )),
                Arc::new(SentimentNode::new(generator.clone())),
            ],
        );
        let fundamentals_branch = Branch::new(
            BranchKind::Fundamentals,
            vec![Arc::new(FundamentalsNode::new(
                Arc::clone(&collaborators.fundamentals),
                collaborators.prices.clone(),
                timeout,
            ))],
        );

        Ok(Self {
            classify: Arc::new(ClassifyNode::new(Arc::clone(&collaborators.classifier), timeout)),
            portfolio: Arc::new(PortfolioNode::new(generator.clone())),
            executor: BranchExecutor::new(news_branch, fundamentals_branch)?,
            synthesis: Arc::new(SynthesisNode::new(generator.clone())),
            advice: Arc::new(AdviceNode::new(generator.clone(), settings.advice_format)),
            strategy: Arc::new(StrategyNode::new(generator)),
            settings,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one request from inside an async context.
    ///
    /// The fork-join blocks the current thread on the thread-pool backend.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let mut ctx = match self.prepare(request).await? {
            Prepared::Halted(outcome) => return Ok(outcome),
            Prepared::Ready(ctx) => ctx,
        };
        let (news, fundamentals) = self.enrich(&mut ctx)?;
        self.finish(ctx, news, fundamentals).await
    }

    /// Run one request from synchronous code.
    ///
    /// The fork-join runs outside any scheduler, so the executor starts and
    /// tears down its own cooperative one.
    pub fn run_blocking(&self, request: RunRequest) -> Result<RunOutcome> {
        if Handle::try_current().is_ok() {
            return Err(PipelineError::Runtime(
                "run_blocking called from inside an async runtime, use run".to_string(),
            ));
        }
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PipelineError::Runtime(format!("failed to build scheduler: {}", e)))?;

        let mut ctx = match runtime.block_on(self.prepare(request))? {
            Prepared::Halted(outcome) => return Ok(outcome),
            Prepared::Ready(ctx) => ctx,
        };
        let (news, fundamentals) = self.enrich(&mut ctx)?;
        runtime.block_on(self.finish(ctx, news, fundamentals))
    }

    /// Entry, classification, early halt and, on the strategy route, the portfolio node.
    async fn prepare(&self, request: RunRequest) -> Result<Prepared> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        let hints = validate(&request).map_err(|err| {
            warn!(run_id = %run_id, error = %err, "Rejected request");
            err
        })?;

        info!(run_id = %run_id, hints = hints.len(), "Pipeline run started");
        let mut trace = vec![format!("{}: query accepted, {} symbol hint(s)", Stage::Entry, hints.len())];

        let state = AnalysisState::builder()
            .run_id(run_id)
            .query(request.query.trim())
            .symbols(hints)
            .profile(request.profile.unwrap_or_default())
            .build();

        stage(run_id, Stage::Classifying);
        let mut state = invoke(self.classify.as_ref(), state)
            .await
            .map_err(|err| failed(run_id, err))?;
        trace.push(format!(
            "{}: usage={} symbols={}",
            Stage::Classifying,
            state.usage.map(|u| u.as_str()).unwrap_or("unset"),
            symbol_list(state.symbols())
        ));

        let route = route_state(&state);
        if route == Route::NotApplicable {
            info!(run_id = %run_id, "Request is not about investing, halting");
            trace.push(format!("{}: not_applicable, halting before enrichment", Stage::Routing));
            trace.push(Stage::Done.to_string());
            let ctx = RunContext {
                run_id,
                started,
                state,
                trace,
            };
            return Ok(Prepared::Halted(ctx.outcome(route)));
        }

        if route == Route::Strategy {
            state = invoke(self.portfolio.as_ref(), state)
                .await
                .map_err(|err| failed(run_id, err))?;
            let summary = if state.portfolio.is_empty() { "degraded" } else { "summarised" };
            trace.push(format!(
                "PORTFOLIO: {} symbols={}",
                summary,
                symbol_list(state.symbols())
            ));
        }

        require_symbols(run_id, &state)?;

        Ok(Prepared::Ready(RunContext {
            run_id,
            started,
            state,
            trace,
        }))
    }

    fn enrich(&self, ctx: &mut RunContext) -> Result<(BranchResult, BranchResult)> {
        let backend = Backend::detect();
        stage(ctx.run_id, Stage::Enriching);
        ctx.trace.push(format!("{}: backend={}", Stage::Enriching, backend.as_str()));

        self.executor
            .fork_join_with(backend, &ctx.state)
            .map_err(|err| failed(ctx.run_id, err))
    }

    /// Merge, synthesis, routing and the terminal node.
    async fn finish(
        &self,
        mut ctx: RunContext,
        news: BranchResult,
        fundamentals: BranchResult,
    ) -> Result<RunOutcome> {
        let run_id = ctx.run_id;

        stage(run_id, Stage::Merging);
        let statuses = format!("news={} fundamentals={}", news.status(), fundamentals.status());
        let merged = merge(&ctx.state, news, fundamentals).map_err(|err| failed(run_id, err))?;
        ctx.trace.push(format!("{}: {}", Stage::Merging, statuses));

        stage(run_id, Stage::Synthesizing);
        let state = invoke(self.synthesis.as_ref(), merged)
            .await
            .map_err(|err| failed(run_id, err))?;
        let synthesis = if state.market_trends.is_empty() { "degraded" } else { "written" };
        ctx.trace.push(format!("{}: market trends {}", Stage::Synthesizing, synthesis));

        stage(run_id, Stage::Routing);
        let route = route_state(&state);
        ctx.trace.push(format!("{}: {}", Stage::Routing, route));

        let terminal = match route {
            Route::Advice => Some(&self.advice),
            Route::Strategy => Some(&self.strategy),
            Route::NotApplicable => None,
        };

        ctx.state = match terminal {
            Some(node) => {
                stage(run_id, Stage::Generating);
                ctx.trace.push(format!("{}: {}", Stage::Generating, node.name()));
                invoke(node.as_ref(), state)
                    .await
                    .map_err(|err| failed(run_id, err))?
            }
            None => state,
        };

        ctx.trace.push(Stage::Done.to_string());
        let outcome = ctx.outcome(route);
        info!(run_id = %run_id, route = %route, elapsed_ms = outcome.elapsed_ms, "Pipeline run finished");
        Ok(outcome)
    }
}

/// Advice and strategy runs need at least one symbol before the fork.
fn require_symbols(run_id: Uuid, state: &AnalysisState) -> Result<()> {
    if !state.symbols().is_empty() {
        return Ok(());
    }
    let err = PipelineError::Validation(
        "no stock symbols were supplied or found in the query".to_string(),
    );
    warn!(run_id = %run_id, error = %err, "Rejected request");
    Err(err)
}

fn stage(run_id: Uuid, stage: Stage) {
    debug!(run_id = %run_id, stage = %stage, "Stage transition");
}

fn failed(run_id: Uuid, err: PipelineError) -> PipelineError {
    error!(run_id = %run_id, stage = %err.stage(), error = %err, "Pipeline run failed");
    err
}
