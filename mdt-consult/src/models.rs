use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Clinical modality a specialist is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    ChiefComplaint,
    Lab,
    Imaging,
    Pathology,
}

impl Specialty {
    pub const ALL: [Specialty; 4] = [
        Specialty::ChiefComplaint,
        Specialty::Lab,
        Specialty::Imaging,
        Specialty::Pathology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::ChiefComplaint => "chief_complaint",
            Specialty::Lab => "lab",
            Specialty::Imaging => "imaging",
            Specialty::Pathology => "pathology",
        }
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub age: String,
    pub sex: String,
    pub chief_complaints: String,
    pub present_illness: String,
    pub physical_examination: String,
}

/// The part of a case that specialists are allowed to see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    pub patient_info: PatientInfo,
    pub lab_results: String,
    pub imaging_results: String,
    pub pathology_results: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub diagnosis: String,
    pub options: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    pub clinical: ClinicalRecord,
    pub ground_truth: GroundTruth,
}

impl Case {
    /// Text a specialist seeds from, or `None` when the specialty has nothing to work on.
    pub fn slice(&self, specialty: Specialty) -> Option<String> {
        let record = &self.clinical;
        let text = match specialty {
            Specialty::ChiefComplaint => format!(
                "{} {}",
                record.patient_info.chief_complaints, record.patient_info.present_illness
            ),
            Specialty::Lab => record.lab_results.clone(),
            Specialty::Imaging => record.imaging_results.clone(),
            Specialty::Pathology => record.pathology_results.clone(),
        };
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    pub fn eligible_specialties(&self) -> Vec<Specialty> {
        Specialty::ALL
            .into_iter()
            .filter(|specialty| self.slice(*specialty).is_some())
            .collect()
    }
}

/// Opinions per specialist, `None` where the oracle produced nothing.
pub type RoundOpinions = BTreeMap<Specialty, Option<String>>;

/// Round number → specialist → opinion. Round 1 holds the seeded opinions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpinionHistory(BTreeMap<u32, RoundOpinions>);

impl OpinionHistory {
    pub fn seeded(opinions: RoundOpinions) -> Self {
        let mut history = Self::default();
        history.0.insert(1, opinions);
        history
    }

    pub fn round(&self, round: u32) -> Option<&RoundOpinions> {
        self.0.get(&round)
    }

    pub fn opinion(&self, round: u32, specialty: Specialty) -> Option<&str> {
        self.0
            .get(&round)
            .and_then(|opinions| opinions.get(&specialty))
            .and_then(|opinion| opinion.as_deref())
    }

    /// The specialist's seeded opinion, the anchor for every revision.
    pub fn original(&self, specialty: Specialty) -> Option<&str> {
        self.opinion(1, specialty)
    }

    /// Append a round. Existing rounds are never replaced.
    pub fn push_round(&mut self, round: u32, opinions: RoundOpinions) -> bool {
        if self.0.contains_key(&round) {
            return false;
        }
        self.0.insert(round, opinions);
        true
    }

    pub fn last_round(&self) -> Option<u32> {
        self.0.keys().next_back().copied()
    }

    pub fn latest(&self) -> Option<&RoundOpinions> {
        self.0.values().next_back()
    }
}

type TurnLog = BTreeMap<Specialty, BTreeMap<Specialty, Option<String>>>;

/// Round → turn → source → target → critique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionLog(BTreeMap<u32, BTreeMap<u32, TurnLog>>);

impl InteractionLog {
    /// Every (round, turn, source, target) slot, each initially absent. Sources are
    /// paired with themselves too, so the slot count is `rounds * turns * n * n`.
    pub fn skeleton(rounds: u32, turns: u32, participants: &[Specialty]) -> Self {
        let turn_log = || -> TurnLog {
            participants
                .iter()
                .map(|source| {
                    let targets: BTreeMap<Specialty, Option<String>> =
                        participants.iter().map(|target| (*target, None)).collect();
                    (*source, targets)
                })
                .collect()
        };

        let log = (1..=rounds)
            .map(|round| {
                let round_log: BTreeMap<u32, TurnLog> =
                    (1..=turns).map(|turn| (turn, turn_log())).collect();
                (round, round_log)
            })
            .collect();
        Self(log)
    }

    /// Store a critique in a pre-initialized slot. Returns `false` for unknown slots.
    pub fn record(
        &mut self,
        round: u32,
        turn: u32,
        source: Specialty,
        target: Specialty,
        critique: Option<String>,
    ) -> bool {
        match self
            .0
            .get_mut(&round)
            .and_then(|turns| turns.get_mut(&turn))
            .and_then(|sources| sources.get_mut(&source))
            .and_then(|targets| targets.get_mut(&target))
        {
            Some(slot) => {
                *slot = critique;
                true
            }
            None => false,
        }
    }

    pub fn critique(
        &self,
        round: u32,
        turn: u32,
        source: Specialty,
        target: Specialty,
    ) -> Option<&str> {
        self.0
            .get(&round)?
            .get(&turn)?
            .get(&source)?
            .get(&target)?
            .as_deref()
    }

    pub fn slot_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|turns| turns.values())
            .flat_map(|sources| sources.values())
            .map(|targets| targets.len())
            .sum()
    }

    pub fn critique_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|turns| turns.values())
            .flat_map(|sources| sources.values())
            .flat_map(|targets| targets.values())
            .filter(|critique| critique.is_some())
            .count()
    }

    /// Critiques addressed to `target` during `round`, in turn order and then in
    /// `source_order`.
    pub fn feedback_for(
        &self,
        round: u32,
        target: Specialty,
        source_order: &[Specialty],
    ) -> Vec<(Specialty, &str)> {
        let Some(turns) = self.0.get(&round) else {
            return Vec::new();
        };

        turns
            .values()
            .flat_map(|sources| {
                source_order.iter().filter_map(move |source| {
                    sources
                        .get(source)
                        .and_then(|targets| targets.get(&target))
                        .and_then(|critique| critique.as_deref())
                        .map(|critique| (*source, critique))
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscussionRecord {
    pub round_opinions: OpinionHistory,
    pub interaction_log: InteractionLog,
}

/// Persisted outcome of one consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub timestamp: String,
    pub case_info: Case,
    pub discussion: DiscussionRecord,
    pub final_decision: Option<String>,
}

/// Seeded opinions plus the reference blocks they were grounded on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedingOutcome {
    pub opinions: RoundOpinions,
    pub references: BTreeMap<Specialty, String>,
}
