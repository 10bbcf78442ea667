//! Parallel branch executor
//!
//! Runs the news branch and the fundamentals branch concurrently on two
//! independent copies of the pre-fork state and returns both results once
//! both have finished. One port, two backends, picked per call:
//! - `Cooperative`: no runtime in the calling context, so a local
//!   single-threaded scheduler drives both branches as tasks and is torn
//!   down after the join
//! - `ThreadPool`: a runtime is already active, so both branches go to a
//!   two-thread worker pool and only the calling thread blocks on the join
//!
//! A branch failure (error or panic) is caught inside that branch's wrapper
//! and reported in its `BranchResult`; the sibling is never cancelled.

pub mod branch;

pub use branch::{Branch, BranchKind, BranchResult};

use crate::error::{PipelineError, Result};
use crate::state::AnalysisState;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio::task::JoinError;
use tracing::debug;

/// One worker per branch.
pub const WORKER_THREADS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Cooperative,
    ThreadPool,
}

impl Backend {
    /// Capability probe: is a tokio runtime active on this thread?
    pub fn detect() -> Self {
        if Handle::try_current().is_ok() {
            Backend::ThreadPool
        } else {
            Backend::Cooperative
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Cooperative => "cooperative",
            Backend::ThreadPool => "thread_pool",
        }
    }
}

pub struct BranchExecutor {
    news: Arc<Branch>,
    fundamentals: Arc<Branch>,
}

impl BranchExecutor {
    pub fn new(news: Branch, fundamentals: Branch) -> Result<Self> {
        if news.kind() != BranchKind::News || fundamentals.kind() != BranchKind::Fundamentals {
            return Err(PipelineError::Config(format!(
                "branch slots mis-wired: got ({}, {})",
                news.kind(),
                fundamentals.kind()
            )));
        }
        Ok(Self {
            news: Arc::new(news),
            fundamentals: Arc::new(fundamentals),
        })
    }

    /// Fork, run both branches, join. Blocks the calling thread.
    ///
    /// Results come back as `(news, fundamentals)`.
    pub fn fork_join(&self, pre_fork: &AnalysisState) -> Result<(BranchResult, BranchResult)> {
        self.fork_join_with(Backend::detect(), pre_fork)
    }

    /// Same as [`fork_join`](Self::fork_join) with an explicit backend.
    pub fn fork_join_with(
        &self,
        backend: Backend,
        pre_fork: &AnalysisState,
    ) -> Result<(BranchResult, BranchResult)> {
        debug!(run_id = %pre_fork.run_id, backend = backend.as_str(), "Forking branches");

        match backend {
            Backend::Cooperative => self.run_cooperative(pre_fork),
            Backend::ThreadPool => self.run_thread_pool(pre_fork),
        }
    }

    fn run_cooperative(&self, pre_fork: &AnalysisState) -> Result<(BranchResult, BranchResult)> {
        if Handle::try_current().is_ok() {
            return Err(PipelineError::Runtime(
                "cooperative backend cannot start a scheduler inside an active runtime".to_string(),
            ));
        }

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PipelineError::Runtime(format!("failed to build branch scheduler: {}", e)))?;

        let run_id = pre_fork.run_id;
        let news = Arc::clone(&self.news);
        let fundamentals = Arc::clone(&self.fundamentals);
        let news_state = pre_fork.clone();
        let fundamentals_state = pre_fork.clone();

        let (news_result, fundamentals_result) = runtime.block_on(async move {
            let news_task = tokio::spawn(async move { news.execute(news_state).await });
            let fundamentals_task =
                tokio::spawn(async move { fundamentals.execute(fundamentals_state).await });
            (news_task.await, fundamentals_task.await)
        });
        drop(runtime);

        Ok((
            from_join(news_result, BranchKind::News, run_id),
            from_join(fundamentals_result, BranchKind::Fundamentals, run_id),
        ))
    }

    fn run_thread_pool(&self, pre_fork: &AnalysisState) -> Result<(BranchResult, BranchResult)> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(WORKER_THREADS)
            .thread_name(|i| format!("branch-worker-{}", i))
            .build()
            .map_err(|e| PipelineError::Runtime(format!("failed to build worker pool: {}", e)))?;

        let news = self.news.as_ref();
        let fundamentals = self.fundamentals.as_ref();
        let news_state = pre_fork.clone();
        let fundamentals_state = pre_fork.clone();

        let join = move || {
            pool.join(
                move || run_on_worker(news, news_state),
                move || run_on_worker(fundamentals, fundamentals_state),
            )
        };

        // block_in_place is only legal on a multi-thread runtime.
        let results = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(join)
            }
            _ => join(),
        };
        Ok(results)
    }
}

/// Drive one branch to completion on a pool worker with its own scheduler.
fn run_on_worker(branch: &Branch, state: AnalysisState) -> BranchResult {
    let kind = branch.kind();
    let run_id = state.run_id;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        Builder::new_current_thread()
            .enable_all()
            .build()
            .map(|runtime| runtime.block_on(branch.execute(state)))
    }));

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => BranchResult::failed(kind, run_id, format!("failed to build worker scheduler: {}", err)),
        Err(payload) => BranchResult::failed(kind, run_id, panic_message(payload.as_ref())),
    }
}

fn from_join(
    joined: std::result::Result<BranchResult, JoinError>,
    kind: BranchKind,
    run_id: uuid::Uuid,
) -> BranchResult {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            BranchResult::failed(kind, run_id, panic_message(payload.as_ref()))
        }
        Err(err) => BranchResult::failed(kind, run_id, err.to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("branch panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("branch panicked: {}", msg)
    } else {
        "branch panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::{ScriptedModel, StubFundamentals, StubNewsProvider};
    use crate::collaborators::Generator;
    use crate::nodes::{FailurePolicy, FundamentalsNode, NewsNode, Node, SentimentNode};
    use async_trait::async_trait;
    use std::time::{Duration, Instant};
    use uuid::Uuid;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn executor(news: StubNewsProvider, fundamentals: StubFundamentals) -> BranchExecutor {
        let model = Arc::new(ScriptedModel::new("Bullish"));
        let news_branch = Branch::new(
            BranchKind::News,
            vec![
                Arc::new(NewsNode::new(Arc::new(news), 7, 5, TIMEOUT)),
                Arc::new(SentimentNode::new(Generator::new(model, TIMEOUT))),
            ],
        );
        let fundamentals_branch = Branch::new(
            BranchKind::Fundamentals,
            vec![Arc::new(FundamentalsNode::new(Arc::new(fundamentals), None, TIMEOUT))],
        );
        BranchExecutor::new(news_branch, fundamentals_branch).unwrap()
    }

    fn pre_fork() -> AnalysisState {
        AnalysisState::builder()
            .run_id(Uuid::new_v4())
            .query("Should I buy AAPL and TSLA?")
            .symbols(["AAPL", "TSLA"])
            .build()
    }

    struct PanickingNode;

    #[async_trait]
    impl Node for PanickingNode {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn failure_policy(&self) -> FailurePolicy {
            FailurePolicy::Isolating
        }

        async fn run(&self, _state: AnalysisState) -> Result<AnalysisState> {
            panic!("provider exploded");
        }
    }

    /// Scribbles over fields it does not own.
    struct ScribbleNode;

    #[async_trait]
    impl Node for ScribbleNode {
        fn name(&self) -> &'static str {
            "scribble"
        }

        fn failure_policy(&self) -> FailurePolicy {
            FailurePolicy::Isolating
        }

        async fn run(&self, mut state: AnalysisState) -> Result<AnalysisState> {
            state.news = "scribbled".to_string();
            state.fundamentals = "scribbled".to_string();
            state.portfolio = "scribbled".to_string();
            Ok(state)
        }
    }

    fn panicking_executor() -> BranchExecutor {
        let news_branch = Branch::new(BranchKind::News, vec![Arc::new(PanickingNode)]);
        let fundamentals_branch = Branch::new(
            BranchKind::Fundamentals,
            vec![Arc::new(FundamentalsNode::new(Arc::new(StubFundamentals::new()), None, TIMEOUT))],
        );
        BranchExecutor::new(news_branch, fundamentals_branch).unwrap()
    }

    #[test]
    fn test_detect_without_runtime() {
        assert_eq!(Backend::detect(), Backend::Cooperative);
    }

    #[tokio::test]
    async fn test_detect_inside_runtime() {
        assert_eq!(Backend::detect(), Backend::ThreadPool);
    }

    #[test]
    fn test_rejects_miswired_slots() {
        let a = Branch::new(BranchKind::Fundamentals, vec![]);
        let b = Branch::new(BranchKind::News, vec![]);
        assert!(matches!(BranchExecutor::new(a, b), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_cooperative_join_returns_both_branches() {
        let executor = executor(StubNewsProvider::new(2), StubFundamentals::new());
        let (news, fundamentals) = executor
            .fork_join_with(Backend::Cooperative, &pre_fork())
            .unwrap();

        assert_eq!(news.kind, BranchKind::News);
        assert_eq!(news.state.as_ref().unwrap().news_by_symbol.len(), 2);
        assert_eq!(news.state.as_ref().unwrap().market_news, "Bullish");
        assert_eq!(fundamentals.kind, BranchKind::Fundamentals);
        assert_eq!(fundamentals.state.as_ref().unwrap().metrics_by_symbol.len(), 2);
    }

    #[test]
    fn test_backends_are_indistinguishable() {
        let executor = executor(StubNewsProvider::new(2), StubFundamentals::new());
        let state = pre_fork();

        let cooperative = executor.fork_join_with(Backend::Cooperative, &state).unwrap();
        let pooled = executor.fork_join_with(Backend::ThreadPool, &state).unwrap();

        assert_eq!(cooperative, pooled);
    }

    #[test]
    fn test_branches_run_concurrently() {
        let delay = Duration::from_millis(300);
        let executor = executor(
            StubNewsProvider::new(1).with_delay(delay),
            StubFundamentals::new().with_delay(delay),
        );
        let state = AnalysisState::builder().symbols(["AAPL"]).build();

        for backend in [Backend::Cooperative, Backend::ThreadPool] {
            let started = Instant::now();
            let (news, fundamentals) = executor.fork_join_with(backend, &state).unwrap();
            let elapsed = started.elapsed();

            assert!(news.is_ok() && fundamentals.is_ok());
            assert!(elapsed >= delay, "{:?} returned before both branches finished", backend);
            assert!(elapsed < delay * 2 - Duration::from_millis(50), "{:?} ran branches serially", backend);
        }
    }

    #[test]
    fn test_branch_copies_are_independent() {
        let news_branch = Branch::new(BranchKind::News, vec![Arc::new(ScribbleNode)]);
        let fundamentals_branch = Branch::new(BranchKind::Fundamentals, vec![]);
        let executor = BranchExecutor::new(news_branch, fundamentals_branch).unwrap();
        let state = pre_fork();

        for backend in [Backend::Cooperative, Backend::ThreadPool] {
            let (news, fundamentals) = executor.fork_join_with(backend, &state).unwrap();
            assert_eq!(news.state.unwrap().portfolio, "scribbled");
            assert_eq!(fundamentals.state.unwrap(), state);
        }
        assert_eq!(state.news, "");
        assert_eq!(state.portfolio, "");
    }

    #[test]
    fn test_panic_isolated_in_both_backends() {
        let executor = panicking_executor();

        for backend in [Backend::Cooperative, Backend::ThreadPool] {
            let (news, fundamentals) = executor.fork_join_with(backend, &pre_fork()).unwrap();

            assert!(news.state.is_none());
            assert!(news.error.as_deref().unwrap().contains("provider exploded"));
            assert!(fundamentals.is_ok());
            assert_eq!(fundamentals.state.unwrap().metrics_by_symbol.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_cooperative_refused_inside_runtime() {
        let executor = executor(StubNewsProvider::new(1), StubFundamentals::new());
        let err = executor
            .fork_join_with(Backend::Cooperative, &pre_fork())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Runtime(_)));
    }

    #[tokio::test]
    async fn test_thread_pool_from_current_thread_runtime() {
        let executor = executor(StubNewsProvider::new(2), StubFundamentals::new());
        let (news, fundamentals) = executor.fork_join(&pre_fork()).unwrap();
        assert!(news.is_ok());
        assert!(fundamentals.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_thread_pool_from_multi_thread_runtime() {
        let executor = executor(StubNewsProvider::failing(), StubFundamentals::new());
        let (news, fundamentals) = executor.fork_join(&pre_fork()).unwrap();

        // Isolated failure: the branch completes with its fields at defaults.
        let news_state = news.state.unwrap();
        assert!(news_state.news_by_symbol.is_empty());
        assert_eq!(news_state.market_news, "");
        assert_eq!(fundamentals.state.unwrap().metrics_by_symbol.len(), 2);
    }
}
