#![allow(dead_code)]

use async_trait::async_trait;
use consult_flow::{FsArtifactStore, RetryPolicy};
use mdt_consult::{
    CaseRunner, DiscussionSettings, ErrorLog, KnowledgeRetriever, OracleError, ReasoningOracle,
    RetrievalError, Snippet, SpecialistTeam,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Seed,
    Participation,
    Critique,
    Revision,
    Final,
}

impl PromptKind {
    pub fn classify(prompt: &str) -> Self {
        if prompt.starts_with("You are an experienced") {
            PromptKind::Seed
        } else if prompt.contains("Do you need to contribute") {
            PromptKind::Participation
        } else if prompt.contains("UPDATED diagnostic tree") {
            PromptKind::Revision
        } else if prompt.contains("head of the medical team") {
            PromptKind::Final
        } else {
            PromptKind::Critique
        }
    }
}

/// Answers by prompt kind and records every prompt it sees.
pub struct ScriptedOracle {
    participation: String,
    calls: Mutex<Vec<(PromptKind, String)>>,
}

impl ScriptedOracle {
    pub fn new(participation: &str) -> Self {
        Self {
            participation: participation.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(PromptKind, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, kind: PromptKind) -> usize {
        self.calls().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let kind = PromptKind::classify(prompt);
        self.calls.lock().unwrap().push((kind, prompt.to_string()));
        Ok(match kind {
            PromptKind::Seed => "SEED tree".to_string(),
            PromptKind::Participation => self.participation.clone(),
            PromptKind::Critique => "critique text".to_string(),
            PromptKind::Revision => "REVISED tree".to_string(),
            PromptKind::Final => r#"{"selected_options": "B", "evi_tree": "..."}"#.to_string(),
        })
    }
}

/// Returns one snippet per query. The first `failures` queries fail.
pub struct CountingRetriever {
    queries: AtomicUsize,
    failures: usize,
}

impl CountingRetriever {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            queries: AtomicUsize::new(0),
            failures,
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KnowledgeRetriever for CountingRetriever {
    async fn query(&self, text: &str, _k: usize) -> Result<Vec<Snippet>, RetrievalError> {
        let n = self.queries.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(RetrievalError::Transport("connection refused".into()));
        }
        Ok(vec![Snippet {
            title: "Reference".into(),
            content: format!("about {}", text.chars().take(20).collect::<String>()),
            score: 1.0,
        }])
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub oracle: Arc<ScriptedOracle>,
    pub retriever: Arc<CountingRetriever>,
    pub error_log: Arc<ErrorLog>,
    pub runner: CaseRunner,
}

impl Harness {
    pub fn new(oracle: ScriptedOracle, retriever: CountingRetriever, settings: DiscussionSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cases")).unwrap();
        std::fs::create_dir_all(dir.path().join("result")).unwrap();

        let oracle = Arc::new(oracle);
        let retriever = Arc::new(retriever);
        let shared_retriever = retriever.clone();
        let team = SpecialistTeam::assemble(oracle.clone(), 3, move |_| {
            shared_retriever.clone() as Arc<dyn KnowledgeRetriever>
        });
        let error_log = Arc::new(ErrorLog::new(dir.path().join("error_log.txt")));
        let store = Arc::new(FsArtifactStore::new(dir.path().join("result")));

        let runner = CaseRunner::new(Arc::new(team), oracle.clone(), store, error_log.clone())
            .with_settings(settings)
            .with_retry(RetryPolicy::exponential(3, Duration::from_millis(1)))
            .with_seed(Some(17));

        Self {
            dir,
            oracle,
            retriever,
            error_log,
            runner,
        }
    }

    pub fn cases_dir(&self) -> PathBuf {
        self.dir.path().join("cases")
    }

    pub fn write_case(&self, name: &str, json: &str) -> PathBuf {
        let path = self.cases_dir().join(name);
        std::fs::write(&path, json).unwrap();
        path
    }

    pub fn artifact(&self, key: &str) -> PathBuf {
        self.dir.path().join("result").join(key)
    }

    pub fn error_log_text(&self) -> String {
        std::fs::read_to_string(self.error_log.path()).unwrap_or_default()
    }
}

pub fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

pub const LAB_ONLY_CASE: &str = r#"{
    "Age": 61,
    "Sex": "male",
    "Laboratory-Examination": "WBC 15.2 x10^9/L, CRP 120 mg/L, procalcitonin 4.1 ng/mL",
    "options": "A. Viral infection\nB. Bacterial sepsis\nC. Lymphoma",
    "Diagnosis": "Bacterial sepsis",
    "label": "B"
}"#;

pub const FULL_CASE: &str = r#"{
    "Age": "45",
    "Sex": "female",
    "Chief-Complaints": "cough and night sweats",
    "Present-Illness": "for six weeks with weight loss",
    "Physical-Examination": "apical crackles",
    "Laboratory-Examination": "ESR 80 mm/h",
    "CT影像检查": "cavitary lesion in right upper lobe",
    "病理检查": "caseating granuloma",
    "options": "A. Lung cancer\nB. Tuberculosis",
    "Diagnosis": "Tuberculosis",
    "label": "B"
}"#;
