use crate::agent::action::ActionExecutor;
use crate::agent::explain::ExplanationGenerator;
use crate::agent::llm::{LlmClient, LlmProvider};
use crate::agent::page::LivePage;
use crate::agent::planner::ActionPlanner;
use crate::agent::ranker::IntentRanker;
use crate::agent::resolver::ActionResolver;
use crate::agent::snapshot::analyze_page;
use crate::agent::types::{CommandOutcome, PageAnalysis};
use crate::config::{AIConfig, PipelineConfig};
use crate::error::LlmError;
use std::sync::Arc;
use uuid::Uuid;

/// Command pipeline: analyze, plan, resolve and execute each action, explain.
pub struct DemoAgent {
    planner: ActionPlanner,
    resolver: ActionResolver,
    explainer: ExplanationGenerator,
    analysis_cap: usize,
}

impl DemoAgent {
    /// `planning` also narrates; `ranking` picks elements when the heuristic misses
    pub fn new(
        planning: Arc<dyn LlmProvider>,
        ranking: Arc<dyn LlmProvider>,
        pipeline: &PipelineConfig,
    ) -> Self {
        let ranker = IntentRanker::new(ranking, pipeline.rank_candidate_cap);
        let executor = ActionExecutor::new(pipeline);

        Self {
            planner: ActionPlanner::new(Arc::clone(&planning), pipeline.plan_element_cap),
            resolver: ActionResolver::new(ranker, executor, pipeline.rank_candidate_cap),
            explainer: ExplanationGenerator::new(planning),
            analysis_cap: pipeline.analysis_element_cap,
        }
    }

    /// Build providers from the AI configuration
    pub fn from_config(ai: &AIConfig, pipeline: &PipelineConfig) -> Result<Self, LlmError> {
        let client = LlmClient::new(ai.clone());
        let planning = client.default_llm()?;
        let ranking = client.ranking_llm()?;
        tracing::info!(
            "Demo agent using {}:{} for planning, {}:{} for ranking",
            planning.name(),
            planning.model(),
            ranking.name(),
            ranking.model()
        );
        Ok(Self::new(planning, ranking, pipeline))
    }

    /// Process one command to completion.
    ///
    /// Always returns every planned action in plan order plus an explanation,
    /// even when all of them failed. Callers must not run two commands on the
    /// same page concurrently.
    pub async fn process_command(&self, page: &dyn LivePage, command: &str) -> CommandOutcome {
        tracing::info!("Processing command: \"{}\"", command);

        let analysis = match analyze_page(page, self.analysis_cap).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!("Page analysis failed, planning without context: {}", e);
                PageAnalysis::default()
            }
        };

        let plan = self.planner.plan(command, &analysis).await;

        let mut executed = Vec::with_capacity(plan.len());
        for action in plan {
            let result = self.resolver.resolve_and_execute(page, action, command).await;
            tracing::info!(
                "{} '{}' -> {} after {} attempt(s)",
                result.action_type,
                result.description,
                if result.success { "ok" } else { "failed" },
                result.attempts
            );
            executed.push(result);
        }

        let explanation = self.explainer.explain(command, &executed, &analysis).await;

        CommandOutcome {
            id: Uuid::new_v4().to_string(),
            explanation,
            actions: executed,
        }
    }
}
