//! The discussion protocol between specialists.
//!
//! A session starts from the seeded opinions (round 1). Every round runs a fixed
//! number of turns; in each turn every active specialist, in a session order shuffled
//! once, decides whether to speak and, if so, critiques a random subset of its
//! colleagues. When the turns are over each specialist rewrites its opinion from its
//! *seeded* opinion plus the critiques it received that round. After the last round a
//! single synthesis call produces the final decision.
//!
//! Oracle failures never abort a session: a failed call is an absent critique,
//! opinion or decision, and an unreadable participation answer is a decline.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Case, InteractionLog, OpinionHistory, RoundOpinions, Specialty};
use crate::oracle::ReasoningOracle;

/// Placeholder used in prompts where a specialist has no opinion.
pub const NO_OPINION: &str = "(no opinion available)";

/// Token that marks a participation answer as affirmative.
pub const AFFIRMATIVE_TOKEN: &str = "Yes";
const DECLINE_TOKEN: &str = "No";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscussionSettings {
    pub rounds: u32,
    pub turns: u32,
    /// Chance that a speaking specialist addresses each colleague.
    pub target_probability: f64,
}

impl Default for DiscussionSettings {
    fn default() -> Self {
        Self {
            rounds: 1,
            turns: 1,
            target_probability: 0.7,
        }
    }
}

/// Answer to "do you want to contribute this turn?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participation {
    Affirmative,
    Declined,
    Unparseable,
}

impl Participation {
    /// Affirmative iff the answer contains the literal affirmative token. A failed call
    /// is unparseable.
    pub fn from_response(response: Option<&str>) -> Self {
        match response {
            Some(text) if text.contains(AFFIRMATIVE_TOKEN) => Participation::Affirmative,
            Some(text) if text.contains(DECLINE_TOKEN) => Participation::Declined,
            _ => Participation::Unparseable,
        }
    }

    /// Only a clear yes counts; unparseable answers are treated as declines.
    pub fn participates(self) -> bool {
        matches!(self, Participation::Affirmative)
    }
}

/// Everything a session accumulates. Serializable so the workflow can carry it
/// between tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscussionState {
    /// Active specialists in speaking order.
    pub order: Vec<Specialty>,
    pub history: OpinionHistory,
    pub interactions: InteractionLog,
    /// Round that runs next; past `rounds` once the discussion is over.
    pub current_round: u32,
    pub rounds: u32,
}

impl DiscussionState {
    pub fn has_pending_round(&self) -> bool {
        self.current_round <= self.rounds
    }
}

pub struct DiscussionCoordinator {
    oracle: Arc<dyn ReasoningOracle>,
    settings: DiscussionSettings,
    rng: Mutex<StdRng>,
}

impl DiscussionCoordinator {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, settings: DiscussionSettings, rng: StdRng) -> Self {
        Self {
            oracle,
            settings,
            rng: Mutex::new(rng),
        }
    }

    pub fn with_seed(oracle: Arc<dyn ReasoningOracle>, settings: DiscussionSettings, seed: u64) -> Self {
        Self::new(oracle, settings, StdRng::seed_from_u64(seed))
    }

    pub fn settings(&self) -> &DiscussionSettings {
        &self.settings
    }

    /// Start a session from seeded opinions. Specialists whose seed is absent stay in
    /// round 1 of the history but take no part in the discussion.
    pub fn open_session(&self, seeds: RoundOpinions) -> DiscussionState {
        let mut order: Vec<Specialty> = seeds
            .iter()
            .filter(|(_, opinion)| opinion.is_some())
            .map(|(specialty, _)| *specialty)
            .collect();
        self.with_rng(|rng| order.shuffle(rng));

        let interactions = InteractionLog::skeleton(self.settings.rounds, self.settings.turns, &order);
        info!(
            participants = order.len(),
            rounds = self.settings.rounds,
            turns = self.settings.turns,
            "discussion session opened"
        );

        DiscussionState {
            order,
            history: OpinionHistory::seeded(seeds),
            interactions,
            current_round: 1,
            rounds: self.settings.rounds,
        }
    }

    /// Run every turn of the current round, then the revision step.
    pub async fn run_round(&self, case: &Case, state: &mut DiscussionState) -> Result<()> {
        let round = state.current_round;
        let mut speakers = 0usize;
        let mut critiques = 0usize;

        for turn in 1..=self.settings.turns {
            debug!(case = %case.id, round, turn, "turn started");
            let context = discussion_context(case, round, turn, state)?;

            for source in state.order.clone() {
                let participation = self.participation(source, &context).await;
                if !participation.participates() {
                    debug!(case = %case.id, round, turn, source = %source, ?participation, "specialist stays silent");
                    continue;
                }
                speakers += 1;

                let targets = self.choose_targets(source, &state.order);
                for target in targets {
                    let critique = self.critique(source, target, &context).await;
                    if critique.is_some() {
                        critiques += 1;
                    }
                    state.interactions.record(round, turn, source, target, critique);
                }
            }
        }

        let revised = self.revise_opinions(round, state).await;
        state.history.push_round(round + 1, revised);
        state.current_round = round + 1;

        info!(case = %case.id, round, speakers, critiques, "discussion round finished");
        Ok(())
    }

    /// Each other candidate is picked independently with the configured probability.
    pub fn choose_targets(&self, source: Specialty, candidates: &[Specialty]) -> Vec<Specialty> {
        let probability = self.settings.target_probability;
        self.with_rng(|rng| {
            candidates
                .iter()
                .copied()
                .filter(|candidate| *candidate != source)
                .filter(|_| rng.random::<f64>() < probability)
                .collect()
        })
    }

    /// Single synthesis call over the last round's opinions.
    pub async fn finalize(&self, case: &Case, state: &DiscussionState) -> Result<Option<String>> {
        let prompt = final_decision_prompt(case, state)?;
        let decision = self.ask("final decision", &prompt).await;
        info!(case = %case.id, decided = decision.is_some(), "final decision synthesized");
        Ok(decision)
    }

    async fn participation(&self, source: Specialty, context: &str) -> Participation {
        let prompt = participation_prompt(source, context);
        let response = self.ask("participation", &prompt).await;
        Participation::from_response(response.as_deref())
    }

    async fn critique(&self, source: Specialty, target: Specialty, context: &str) -> Option<String> {
        let prompt = critique_prompt(source, target, context);
        self.ask("critique", &prompt).await
    }

    async fn revise_opinions(&self, round: u32, state: &DiscussionState) -> RoundOpinions {
        let mut revised = BTreeMap::new();
        for specialty in &state.order {
            let feedback = state.interactions.feedback_for(round, *specialty, &state.order);
            let prompt = revision_prompt(*specialty, state.history.original(*specialty), &feedback);
            let opinion = self.ask("revision", &prompt).await;
            revised.insert(*specialty, opinion);
        }
        revised
    }

    /// One oracle round-trip. Failures and blank answers become `None`.
    async fn ask(&self, purpose: &'static str, prompt: &str) -> Option<String> {
        match self.oracle.complete(prompt).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                warn!(purpose, "oracle returned a blank completion");
                None
            }
            Err(e) => {
                warn!(purpose, error = %e, "oracle call failed");
                None
            }
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *rng)
    }
}

fn clinical_json(case: &Case) -> Result<String> {
    Ok(serde_json::to_string_pretty(&case.clinical)?)
}

fn opinion_lines<'a>(order: &[Specialty], opinions: Option<&'a RoundOpinions>) -> String {
    order
        .iter()
        .map(|specialty| {
            let opinion = opinions
                .and_then(|round| round.get(specialty))
                .and_then(|opinion| opinion.as_deref())
                .unwrap_or(NO_OPINION);
            format!("\n{specialty}: {opinion}")
        })
        .collect()
}

/// Shared context for one turn: the case, where we are, and the current opinions.
pub fn discussion_context(
    case: &Case,
    round: u32,
    turn: u32,
    state: &DiscussionState,
) -> Result<String> {
    Ok(format!(
        "1. Patient case:\n{}\n\n2. Current round: Round {round}, Turn {turn}\n\n3. Diagnosis opinions from each doctor:{}",
        clinical_json(case)?,
        opinion_lines(&state.order, state.history.round(round)),
    ))
}

fn participation_prompt(source: Specialty, context: &str) -> String {
    format!(
        r#"You are the {source} doctor in a multidisciplinary consultation.
Look for the points where your view differs from your colleagues'. Speak up whenever your perspective could resolve a disagreement, correct a diagnosis or persuade the others, even if several opinions have already been given.
Do you need to contribute new insights or discuss with the other doctors this turn?
Answer only with "Yes" or "No".

Current situation:
{context}
"#
    )
}

fn critique_prompt(source: Specialty, target: Specialty, context: &str) -> String {
    format!(
        r#"As the {source} doctor, give your professional opinion on the diagnosis proposed by the {target} doctor.

{context}

Be concise and cover:
1. Which parts of the {target} doctor's opinion you agree or disagree with
2. Additional insights or suggestions from your own specialty
3. How both perspectives can be combined into a better diagnosis
"#
    )
}

fn revision_prompt(
    specialty: Specialty,
    original: Option<&str>,
    feedback: &[(Specialty, &str)],
) -> String {
    let feedback_lines: String = feedback
        .iter()
        .map(|(source, critique)| format!("\n{source}: {critique}"))
        .collect();

    format!(
        r#"As the {specialty} doctor, write an UPDATED diagnostic tree from your original assessment and the feedback you received.

Output Format:
{specialty} Doctor Reasoning Pathway
├── Disease 1
│   └── Analysis: ...
│       ├── Evidence 1: ...
│       ├── Evidence 2: ...
│       └── Evidence 3: ...
├── Disease 2
│   └── Analysis: ...
│       ├── Evidence 1: ...
│       ├── Evidence 2: ...
│       └── Evidence 3: ...
└── ...
Output only the evidence tree in exactly this format. Do not add any text or explanation outside the tree.

1. Original diagnosis:
{original}

2. Feedback received in this round:{feedback_lines}
"#,
        original = original.unwrap_or(NO_OPINION),
    )
}

/// Synthesis prompt over the last populated round of the history.
pub fn final_decision_prompt(case: &Case, state: &DiscussionState) -> Result<String> {
    let last_round = state.history.latest();
    let opinions: String = last_round
        .map(|opinions| {
            opinions
                .iter()
                .map(|(specialty, opinion)| {
                    format!("{specialty}: {}\n", opinion.as_deref().unwrap_or(NO_OPINION))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(format!(
        r#"As the head of the medical team, make the final diagnosis from the information below.

1. Patient case:
{case_json}

2. Diagnosis opinions from the last round:
{opinions}
3. Diagnosis options:
{options}

The output must contain:
1. The final diagnosis (the letter of the matching option)
2. The evidence tree, formatted as follows:
Reasoning Pathway
├── Disease 1
│   └── Analysis: ...
│       ├── Evidence 1: ...
│       ├── Evidence 2: ...
│       └── Evidence 3: ...
└── ...
Answer in JSON, strictly in the format below, with no other words:
{{
    "selected_options": "",
    "evi_tree": ""
}}
"#,
        case_json = clinical_json(case)?,
        options = case.ground_truth.options,
    ))
}
