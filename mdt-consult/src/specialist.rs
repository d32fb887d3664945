//! Specialist agents: one parameterized agent, four profiles.
//!
//! A profile says which slice of the case the specialist reads, which corpus its
//! retriever searches, and how its instructions name the findings it extracts. The
//! seeding prompt itself is shared.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::models::{Case, SeedingOutcome, Specialty};
use crate::oracle::ReasoningOracle;
use crate::retriever::{KnowledgeRetriever, RetrievalError, format_references};

pub const DEFAULT_TOP_K: usize = 3;

/// Describes one specialist role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialistProfile {
    pub specialty: Specialty,
    /// Retrieval corpus searched for this role.
    pub corpus: &'static str,
    pub role: &'static str,
    /// What the specialist analyzes, e.g. "laboratory test results".
    pub subject: &'static str,
    /// Heading of the first analysis step, e.g. "Abnormal Indicators".
    pub finding_label: &'static str,
    /// Evidence placeholders shown in the output template.
    pub evidence_labels: [&'static str; 3],
    pub pathway_title: &'static str,
}

impl SpecialistProfile {
    pub const CHIEF_COMPLAINT: SpecialistProfile = SpecialistProfile {
        specialty: Specialty::ChiefComplaint,
        corpus: "StatPearls",
        role: "attending physician responsible for a detailed inquiry into the patient's chief complaints, medical history, and initial physical examination",
        subject: "patient's chief complaints, medical history, and initial physical examination",
        finding_label: "Clinical Clues",
        evidence_labels: ["Chief Complaints", "Medical History", "Physical Examination"],
        pathway_title: "Chief Complaints",
    };

    pub const LAB: SpecialistProfile = SpecialistProfile {
        specialty: Specialty::Lab,
        corpus: "Textbooks",
        role: "laboratory physician responsible for interpreting laboratory test results",
        subject: "laboratory test results",
        finding_label: "Abnormal Indicators",
        evidence_labels: [
            "Abnormal Indicator 1",
            "Abnormal Indicator 2",
            "Abnormal Indicator 3",
        ],
        pathway_title: "Laboratory Test",
    };

    pub const IMAGING: SpecialistProfile = SpecialistProfile {
        specialty: Specialty::Imaging,
        corpus: "Textbooks",
        role: "imaging physician responsible for interpreting imaging studies",
        subject: "imaging test results",
        finding_label: "Abnormal Findings",
        evidence_labels: [
            "Abnormal Finding 1",
            "Abnormal Finding 2",
            "Abnormal Finding 3",
        ],
        pathway_title: "Imaging Test",
    };

    pub const PATHOLOGY: SpecialistProfile = SpecialistProfile {
        specialty: Specialty::Pathology,
        corpus: "Textbooks",
        role: "pathology physician responsible for interpreting pathology reports",
        subject: "pathology test results",
        finding_label: "Abnormal Findings",
        evidence_labels: [
            "Abnormal Finding 1",
            "Abnormal Finding 2",
            "Abnormal Finding 3",
        ],
        pathway_title: "Pathology Test",
    };

    pub const ALL: [SpecialistProfile; 4] = [
        Self::CHIEF_COMPLAINT,
        Self::LAB,
        Self::IMAGING,
        Self::PATHOLOGY,
    ];

    /// Case material shown to this specialist. The chief-complaint role also sees
    /// demographics and the physical exam, which are not part of its search text.
    fn case_block(&self, case: &Case, slice: &str) -> String {
        match self.specialty {
            Specialty::ChiefComplaint => {
                let info = &case.clinical.patient_info;
                format!(
                    "Patient information:\n\
                     - Age: {}\n\
                     - Sex: {}\n\
                     - Chief complaints: {}\n\
                     - Present illness: {}\n\
                     - Physical examination: {}",
                    info.age,
                    info.sex,
                    info.chief_complaints,
                    info.present_illness,
                    info.physical_examination
                )
            }
            _ => format!("The {} are as follows:\n{}", self.subject, slice),
        }
    }

    /// Seeding prompt: role, references, case material and the mandated tree format.
    pub fn seed_prompt(&self, case: &Case, slice: &str, references: &str) -> String {
        let [first, second, third] = self.evidence_labels;
        let finding = self.finding_label;

        format!(
            r#"You are an experienced {role}.

Relevant medical knowledge retrieved for this case:
{references}

{case_block}

Analyze the {subject} and answer as an evidence tree:
1. {finding}: identify the {finding_lower} present in the {subject}.
2. Possible Diseases: list the diseases these {finding_lower} may point to.
3. Reasoning Process: for each disease, briefly explain the reasoning.
4. Evidence: for each disease, summarize the supporting evidence from the {subject}.

Output Format:
{pathway} Clinical Reasoning Pathway
├── Disease 1
│   └── Analysis: brief explanation of the reasoning
│       ├── Evidence 1: {first}
│       ├── Evidence 2: {second}
│       └── Evidence 3: {third}
├── Disease 2
│   └── Analysis: brief explanation of the reasoning
│       ├── Evidence 1: {first}
│       ├── Evidence 2: {second}
│       └── Evidence 3: {third}
└── ...

Output only the evidence tree in exactly this format. Do not add any text or explanation outside the tree."#,
            role = self.role,
            case_block = self.case_block(case, slice),
            subject = self.subject,
            finding_lower = finding.to_lowercase(),
            pathway = self.pathway_title,
        )
    }
}

/// Initial opinion of one specialist and the references it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct SeededOpinion {
    pub opinion: Option<String>,
    pub references: String,
}

pub struct SpecialistAgent {
    profile: SpecialistProfile,
    retriever: Arc<dyn KnowledgeRetriever>,
    oracle: Arc<dyn ReasoningOracle>,
    top_k: usize,
}

impl SpecialistAgent {
    pub fn new(
        profile: SpecialistProfile,
        retriever: Arc<dyn KnowledgeRetriever>,
        oracle: Arc<dyn ReasoningOracle>,
        top_k: usize,
    ) -> Self {
        Self {
            profile,
            retriever,
            oracle,
            top_k,
        }
    }

    pub fn specialty(&self) -> Specialty {
        self.profile.specialty
    }

    /// Seed an opinion from the case. Returns `Ok(None)` when the case has nothing for
    /// this specialty. Retrieval failures propagate; a failed completion leaves the
    /// opinion empty.
    pub async fn seed(&self, case: &Case) -> Result<Option<SeededOpinion>, RetrievalError> {
        let specialty = self.profile.specialty;
        let Some(slice) = case.slice(specialty) else {
            return Ok(None);
        };

        info!(case = %case.id, specialist = %specialty, "specialist reviewing case");

        let snippets = self.retriever.query(&slice, self.top_k).await?;
        let references = format_references(&snippets);
        let prompt = self.profile.seed_prompt(case, &slice, &references);

        let opinion = match self.oracle.complete(&prompt).await {
            Ok(opinion) => Some(opinion),
            Err(e) => {
                warn!(case = %case.id, specialist = %specialty, error = %e, "seeding completion failed");
                None
            }
        };

        Ok(Some(SeededOpinion {
            opinion,
            references,
        }))
    }
}

/// The specialists available to a consultation.
pub struct SpecialistTeam {
    agents: Vec<SpecialistAgent>,
}

impl SpecialistTeam {
    pub fn new(agents: Vec<SpecialistAgent>) -> Self {
        Self { agents }
    }

    /// One agent per profile, each with the retriever chosen for its profile.
    pub fn assemble<F>(oracle: Arc<dyn ReasoningOracle>, top_k: usize, mut retriever_for: F) -> Self
    where
        F: FnMut(&SpecialistProfile) -> Arc<dyn KnowledgeRetriever>,
    {
        let agents = SpecialistProfile::ALL
            .into_iter()
            .map(|profile| {
                let retriever = retriever_for(&profile);
                SpecialistAgent::new(profile, retriever, oracle.clone(), top_k)
            })
            .collect();
        Self::new(agents)
    }

    /// Seed every eligible specialist, one after another.
    pub async fn seed_all(&self, case: &Case) -> Result<SeedingOutcome, RetrievalError> {
        let mut opinions = BTreeMap::new();
        let mut references = BTreeMap::new();

        for agent in &self.agents {
            if let Some(seeded) = agent.seed(case).await? {
                opinions.insert(agent.specialty(), seeded.opinion);
                references.insert(agent.specialty(), seeded.references);
            }
        }

        Ok(SeedingOutcome {
            opinions,
            references,
        })
    }
}
