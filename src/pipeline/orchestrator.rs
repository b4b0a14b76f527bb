use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::models::{EvidenceItem, InstitutionProfile};
use crate::providers::{EmbeddingClient, EvidenceStore, LlmClient, StandardsCatalog, VectorIndex};

use super::gapfinder::GapFinderStage;
use super::mapper::MapperStage;
use super::matcher::SimilarityMatcher;
use super::narrator::NarratorStage;
use super::types::{
    AgentResult, GapRecord, GapReport, Mapping, MapperOutcome, Narrative, NarratorReport,
    PipelineRound, VerificationReport, WorkflowResult, WorkflowStatus,
};
use super::verifier::VerifierStage;
use super::PipelineError;

/// Drives up to `max_rounds` of Mapper → GapFinder → Narrator → Verifier
/// and decides convergence.
///
/// All capabilities are injected at construction; the orchestrator holds no
/// other state beyond the workflow registry. Independent workflows may run
/// concurrently from different threads.
pub struct PipelineOrchestrator {
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    catalog: Arc<dyn StandardsCatalog>,
    config: PipelineConfig,
    workflows: Mutex<HashMap<Uuid, WorkflowEntry>>,
}

struct WorkflowEntry {
    status: WorkflowStatus,
    stop: Arc<AtomicBool>,
}

impl PipelineOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        catalog: Arc<dyn StandardsCatalog>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            llm,
            embedder,
            index,
            catalog,
            config,
            workflows: Mutex::new(HashMap::new()),
        }
    }

    /// Run a workflow under a fresh id.
    pub fn execute(
        &self,
        institution: &InstitutionProfile,
        accreditor_id: &str,
        evidence: &[EvidenceItem],
        max_rounds: u32,
    ) -> Result<WorkflowResult, PipelineError> {
        self.execute_as(Uuid::new_v4(), institution, accreditor_id, evidence, max_rounds)
    }

    /// Convenience entry point: pull the institution's evidence from the
    /// store, then execute.
    pub fn execute_from_store(
        &self,
        store: &dyn EvidenceStore,
        institution: &InstitutionProfile,
        accreditor_id: &str,
        max_rounds: u32,
    ) -> Result<WorkflowResult, PipelineError> {
        let evidence = store.get(institution.id)?;
        self.execute(institution, accreditor_id, &evidence, max_rounds)
    }

    /// Run a workflow under a caller-supplied id, so `stop` and
    /// `get_status` can be coordinated from another thread.
    ///
    /// Callers always receive a `WorkflowResult` with a terminal status and
    /// the full round history; the only `Err` paths are a missing capability
    /// or an unreachable standards catalog, both of which precede round 1.
    pub fn execute_as(
        &self,
        workflow_id: Uuid,
        institution: &InstitutionProfile,
        accreditor_id: &str,
        evidence: &[EvidenceItem],
        max_rounds: u32,
    ) -> Result<WorkflowResult, PipelineError> {
        // Refuse to start rather than degrade: every stage needs the LLM.
        // The embedding/index path degrades inside the matcher instead.
        if !self.llm.is_available() {
            return Err(PipelineError::MissingCapability("llm"));
        }

        let standards = self.catalog.get(accreditor_id, institution.institution_type)?;

        let max_rounds = if max_rounds == 0 {
            self.config.default_max_rounds.max(1)
        } else {
            max_rounds
        };

        let stop = Arc::new(AtomicBool::new(false));
        self.workflows.lock().unwrap().insert(
            workflow_id,
            WorkflowEntry {
                status: WorkflowStatus::Running,
                stop: stop.clone(),
            },
        );

        tracing::info!(
            workflow_id = %workflow_id,
            institution = %institution.name,
            accreditor_id,
            standards = standards.len(),
            evidence = evidence.len(),
            max_rounds,
            "workflow started"
        );

        let matcher = SimilarityMatcher::new(
            self.embedder.as_ref(),
            self.index.as_ref(),
            self.config.similarity_floor,
        );
        matcher.index_standards(&standards);

        let mapper = MapperStage::new(self.llm.as_ref(), &matcher, &self.config);
        let gap_finder = GapFinderStage::new(self.llm.as_ref(), &self.config);
        let narrator = NarratorStage::new(self.llm.as_ref(), &self.config);
        let verifier = VerifierStage::new(&matcher, &self.config);

        let mut rounds: Vec<PipelineRound> = Vec::new();
        let mut accepted: Vec<Mapping> = Vec::new();
        let mut gaps: Vec<GapRecord> = Vec::new();
        let mut narratives: Vec<Narrative> = Vec::new();
        let mut verification: Option<VerificationReport> = None;
        let mut status = WorkflowStatus::Failed;
        let mut error: Option<String> = None;

        'rounds: for round_number in 1..=max_rounds {
            if stop.load(Ordering::Relaxed) {
                status = WorkflowStatus::Stopped;
                break 'rounds;
            }

            let mut agent_results: Vec<AgentResult> = Vec::new();

            // Mapper runs on round 1 only; later rounds reuse the accepted
            // mapping set.
            if round_number == 1 {
                let (result, outcome) = run_stage(
                    "mapper",
                    |o: &MapperOutcome| o.overall_confidence,
                    || mapper.run(institution, evidence, &standards),
                );
                agent_results.push(result);
                match outcome {
                    Some(outcome) => accepted = outcome.accepted,
                    None => {
                        error = last_error(&agent_results);
                        status = WorkflowStatus::Failed;
                        rounds.push(finish_round(round_number, agent_results, false));
                        break 'rounds;
                    }
                }
            }

            if stop.load(Ordering::Relaxed) {
                status = WorkflowStatus::Stopped;
                rounds.push(finish_round(round_number, agent_results, false));
                break 'rounds;
            }

            let (result, report) = run_stage(
                "gap_finder",
                |r: &GapReport| r.confidence,
                || gap_finder.run(&standards, &accepted),
            );
            agent_results.push(result);
            match report {
                Some(report) => gaps = report.detailed_gaps,
                None => {
                    error = last_error(&agent_results);
                    status = WorkflowStatus::Failed;
                    rounds.push(finish_round(round_number, agent_results, false));
                    break 'rounds;
                }
            }

            if stop.load(Ordering::Relaxed) {
                status = WorkflowStatus::Stopped;
                rounds.push(finish_round(round_number, agent_results, false));
                break 'rounds;
            }

            let (result, report) = run_stage(
                "narrator",
                |r: &NarratorReport| r.confidence,
                || narrator.run(&accepted, evidence, &standards, institution),
            );
            agent_results.push(result);
            match report {
                Some(report) => narratives = report.narratives,
                None => {
                    error = last_error(&agent_results);
                    status = WorkflowStatus::Failed;
                    rounds.push(finish_round(round_number, agent_results, false));
                    break 'rounds;
                }
            }

            if stop.load(Ordering::Relaxed) {
                status = WorkflowStatus::Stopped;
                rounds.push(finish_round(round_number, agent_results, false));
                break 'rounds;
            }

            let (result, report) = run_stage(
                "verifier",
                |r: &VerificationReport| r.overall_verification_score,
                || verifier.run(&narratives, evidence),
            );
            agent_results.push(result);
            match report {
                Some(report) => verification = Some(report),
                None => {
                    error = last_error(&agent_results);
                    status = WorkflowStatus::Failed;
                    rounds.push(finish_round(round_number, agent_results, false));
                    break 'rounds;
                }
            }

            let converged = verification
                .as_ref()
                .map(|v| v.overall_verification_score >= self.config.citation_threshold)
                .unwrap_or(false);

            tracing::info!(
                workflow_id = %workflow_id,
                round_number,
                converged,
                "round complete"
            );

            rounds.push(finish_round(round_number, agent_results, converged));

            if converged {
                status = WorkflowStatus::Completed;
                break 'rounds;
            }
            if round_number == max_rounds {
                status = WorkflowStatus::Failed;
                error = Some(format!("did not converge within {max_rounds} round(s)"));
            }
        }

        self.set_status(workflow_id, status);

        tracing::info!(
            workflow_id = %workflow_id,
            status = status.as_str(),
            rounds = rounds.len(),
            "workflow finished"
        );

        Ok(WorkflowResult {
            workflow_id,
            institution_id: institution.id,
            accreditor_id: accreditor_id.to_string(),
            rounds,
            mappings: accepted,
            gaps,
            narratives,
            verification,
            status,
            error,
        })
    }

    /// Current status of a workflow, terminal statuses included.
    pub fn get_status(&self, workflow_id: Uuid) -> Option<WorkflowStatus> {
        self.workflows
            .lock()
            .unwrap()
            .get(&workflow_id)
            .map(|e| e.status)
    }

    /// Request cooperative cancellation. Honored between stages, never
    /// mid-stage. Returns false for unknown or already-terminal workflows.
    pub fn stop(&self, workflow_id: Uuid) -> bool {
        let workflows = self.workflows.lock().unwrap();
        match workflows.get(&workflow_id) {
            Some(entry) if entry.status == WorkflowStatus::Running => {
                entry.stop.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    fn set_status(&self, workflow_id: Uuid, status: WorkflowStatus) {
        if let Some(entry) = self.workflows.lock().unwrap().get_mut(&workflow_id) {
            entry.status = status;
        }
    }
}

/// Run one stage inside the uniform envelope: timing, success flag,
/// serialized payload, confidence.
fn run_stage<T: Serialize>(
    agent_name: &str,
    confidence: impl Fn(&T) -> f32,
    run: impl FnOnce() -> Result<T, PipelineError>,
) -> (AgentResult, Option<T>) {
    let start = Instant::now();
    match run() {
        Ok(value) => {
            let payload = serde_json::to_value(&value).unwrap_or(Value::Null);
            let result = AgentResult {
                agent_name: agent_name.to_string(),
                success: true,
                payload,
                confidence_score: confidence(&value),
                execution_time_ms: start.elapsed().as_millis() as u64,
                error_message: None,
            };
            (result, Some(value))
        }
        Err(e) => {
            tracing::error!(agent = agent_name, error = %e, "stage failed");
            let result = AgentResult {
                agent_name: agent_name.to_string(),
                success: false,
                payload: Value::Null,
                confidence_score: 0.0,
                execution_time_ms: start.elapsed().as_millis() as u64,
                error_message: Some(e.to_string()),
            };
            (result, None)
        }
    }
}

fn finish_round(
    round_number: u32,
    agent_results: Vec<AgentResult>,
    converged: bool,
) -> PipelineRound {
    let overall_confidence = if agent_results.is_empty() {
        0.0
    } else {
        agent_results.iter().map(|r| r.confidence_score).sum::<f32>() / agent_results.len() as f32
    };

    PipelineRound {
        round_number,
        agent_results,
        overall_confidence,
        converged,
    }
}

fn last_error(agent_results: &[AgentResult]) -> Option<String> {
    agent_results.last().and_then(|r| r.error_message.clone())
}
