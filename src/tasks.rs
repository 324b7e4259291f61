//! Daily gentle task and streak persistence
//!
//! Tasks live in a keyed document store under a per-user namespace:
//! `users/{uid}/tasks/{date}` for the daily task, `users/{uid}/streak/data`
//! for the streak counter. The store is an injected trait; the bundled
//! implementation keeps JSON documents on disk.

use crate::ai::TextModel;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Size cap on store documents, matching the limit used for other on-disk
// state to keep a corrupted file from exhausting memory.
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Keyed document reads/writes. `path` segments look like
/// `users/{uid}/tasks/{date}`; writes are last-write-wins except for
/// [`DocumentStore::create_if_absent`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>>;
    async fn set(&self, path: &str, doc: Value) -> Result<()>;
    /// Conditional create: writes `doc` only when no document exists at
    /// `path`, and returns whichever document is stored afterwards. Two
    /// racing callers both receive the winning document.
    async fn create_if_absent(&self, path: &str, doc: Value) -> Result<Value>;
}

/// JSON-file document store rooted at a base directory.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn default_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(".fig"))
    }

    fn file_path(&self, path: &str) -> Result<PathBuf> {
        let mut file_path = self.base_dir.clone();
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(anyhow!("Invalid document path: {}", path));
            }
            file_path.push(segment);
        }
        file_path.set_extension("json");
        Ok(file_path)
    }

    fn read_document(path: &Path) -> Result<Option<Value>> {
        if !path.exists() {
            return Ok(None);
        }
        let metadata = fs::metadata(path)?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(anyhow!("Document exceeds size limits: {}", path.display()));
        }
        let content = fs::read_to_string(path)?;
        let doc = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse document {}", path.display()))?;
        Ok(Some(doc))
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        Self::read_document(&self.file_path(path)?)
    }

    async fn set(&self, path: &str, doc: Value) -> Result<()> {
        let file_path = self.file_path(path)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file_path, serde_json::to_string_pretty(&doc)?)?;
        Ok(())
    }

    async fn create_if_absent(&self, path: &str, doc: Value) -> Result<Value> {
        let file_path = self.file_path(path)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        // create_new is the atomic claim; the loser reads the winner's doc.
        match fs::OpenOptions::new().write(true).create_new(true).open(&file_path) {
            Ok(file) => {
                serde_json::to_writer_pretty(file, &doc)?;
                Ok(doc)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Document already present at {}", path);
                Self::read_document(&file_path)?
                    .ok_or_else(|| anyhow!("Document vanished at {}", path))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Profile record at `users/{uid}`, written once on first sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: String,
    pub email: String,
    pub created_at: String,
}

/// At most one per user per calendar date; created lazily, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyTask {
    pub task: String,
    pub completed: bool,
    pub date: NaiveDate,
    pub created_at: String,
}

/// Consecutive-day completion counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreakCounter {
    pub current_streak: u32,
    /// ISO date of the last completion mark, or empty before the first one.
    #[serde(default)]
    pub last_updated: String,
}

// Calm fallback rotation for days the model is unreachable; the daily task
// should never silently disappear.
const CANNED_TASKS: &[(&str, &str, &str)] = &[
    (
        "Clarity arrives when the mind becomes gentle.",
        "Peace is not the absence of noise, but balance inside it.",
        "Spend 3 minutes today sitting quietly and noticing your breath.",
    ),
    (
        "Consistency shapes destiny.",
        "Small daily acts create long-term strength.",
        "Complete one simple task today without rushing.",
    ),
    (
        "Your thoughts become lighter when you stop fighting them.",
        "Acceptance creates emotional space.",
        "Write down one feeling you're experiencing today.",
    ),
    (
        "Growth happens quietly, not forcefully.",
        "Gentleness is also strength.",
        "Organize one tiny part of your room or workspace.",
    ),
    (
        "Focus is born from intention, not pressure.",
        "A calm mind works faster.",
        "Spend 10 uninterrupted minutes on something meaningful.",
    ),
    (
        "Self-compassion is the beginning of resilience.",
        "You bloom when you stop blaming yourself.",
        "Say one kind sentence to yourself today.",
    ),
    (
        "Stillness teaches more than chaos ever could.",
        "Quiet moments reveal clarity.",
        "Take a slow walk or stretch for 2 minutes mindfully.",
    ),
];

fn canned_task_for(date: NaiveDate) -> String {
    use chrono::Datelike;
    let (quote, definition, task) = CANNED_TASKS[date.ordinal0() as usize % CANNED_TASKS.len()];
    format!("Quote: \"{}\"\nDefinition: {}\nToday's Gentle Task: {}", quote, definition, task)
}

/// Reads and writes the daily task and streak records for one user.
pub struct TaskStore {
    store: Arc<dyn DocumentStore>,
    model: Arc<dyn TextModel>,
}

impl TaskStore {
    pub fn new(store: Arc<dyn DocumentStore>, model: Arc<dyn TextModel>) -> Self {
        Self { store, model }
    }

    fn task_path(uid: &str, date: NaiveDate) -> String {
        format!("users/{}/tasks/{}", uid, date.format("%Y-%m-%d"))
    }

    fn streak_path(uid: &str) -> String {
        format!("users/{}/streak/data", uid)
    }

    fn profile_path(uid: &str) -> String {
        format!("users/{}", uid)
    }

    /// First-run bootstrap: the profile document and a zeroed streak
    /// counter, both conditional so an existing user is left untouched.
    pub async fn ensure_profile(
        &self,
        uid: &str,
        display_name: &str,
        email: &str,
    ) -> Result<UserProfile> {
        let profile = UserProfile {
            display_name: display_name.to_string(),
            email: email.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        let stored = self
            .store
            .create_if_absent(&Self::profile_path(uid), serde_json::to_value(&profile)?)
            .await?;
        self.store
            .create_if_absent(
                &Self::streak_path(uid),
                serde_json::to_value(StreakCounter::default())?,
            )
            .await?;
        serde_json::from_value(stored).context("Malformed profile record")
    }

    /// Return today's task, generating and persisting one on first access.
    /// The conditional write guarantees at most one generated task per user
    /// per day; a racing caller gets the winner's record back.
    pub async fn get_or_create_today_task(
        &self,
        uid: &str,
        display_name: &str,
        today: NaiveDate,
    ) -> Result<DailyTask> {
        let path = Self::task_path(uid, today);
        if let Some(doc) = self.store.get(&path).await? {
            return serde_json::from_value(doc).context("Malformed daily task record");
        }

        let prompt = format!(
            "You are {}'s personal motivational friend.\n\
             Create one short, fun, energetic challenge for today.\n\
             Do not add any intro or quotes, just the challenge text.",
            display_name
        );
        let task_text = match self.model.generate_content(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Task generation failed, using canned task: {}", e);
                canned_task_for(today)
            }
        };

        let task = DailyTask {
            task: task_text,
            completed: false,
            date: today,
            created_at: Utc::now().to_rfc3339(),
        };
        let stored = self
            .store
            .create_if_absent(&path, serde_json::to_value(&task)?)
            .await?;
        serde_json::from_value(stored).context("Malformed daily task record")
    }

    pub async fn current_streak(&self, uid: &str) -> Result<StreakCounter> {
        let doc = self.store.get(&Self::streak_path(uid)).await?;
        Ok(doc.and_then(|d| serde_json::from_value(d).ok()).unwrap_or_default())
    }

    /// Record a YES/NO answer for today's task. Completion on the day
    /// immediately after the last update extends the streak; completion on
    /// any other day restarts it at 1; an explicit NO resets it to 0.
    pub async fn mark_completion(
        &self,
        uid: &str,
        today: NaiveDate,
        did_complete: bool,
    ) -> Result<StreakCounter> {
        let previous = self.current_streak(uid).await?;

        let current_streak = if did_complete {
            let yesterday = today
                .checked_sub_days(Days::new(1))
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            if previous.last_updated == yesterday {
                previous.current_streak + 1
            } else {
                1
            }
        } else {
            0
        };

        let updated = StreakCounter {
            current_streak,
            last_updated: today.format("%Y-%m-%d").to_string(),
        };
        self.store
            .set(&Self::streak_path(uid), serde_json::to_value(&updated)?)
            .await?;

        // Mirror the answer onto the task record when one exists.
        let task_path = Self::task_path(uid, today);
        match self.store.get(&task_path).await? {
            Some(doc) => {
                let mut task: DailyTask =
                    serde_json::from_value(doc).context("Malformed daily task record")?;
                task.completed = did_complete;
                self.store.set(&task_path, serde_json::to_value(&task)?).await?;
            }
            None => warn!("No daily task record for {} on {}", uid, today),
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FakeModel {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextModel for FakeModel {
        async fn generate_content(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().ok_or_else(|| anyhow!("model unavailable"))
        }
    }

    fn fake_model(reply: Option<&str>) -> Arc<FakeModel> {
        Arc::new(FakeModel { reply: reply.map(String::from), calls: AtomicUsize::new(0) })
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path().to_path_buf())?;

        assert_eq!(store.get("users/u1/tasks/2025-03-01").await?, None);

        let doc = serde_json::json!({ "task": "breathe", "completed": false });
        store.set("users/u1/tasks/2025-03-01", doc.clone()).await?;
        assert_eq!(store.get("users/u1/tasks/2025-03-01").await?, Some(doc));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_rejects_traversal() -> Result<()> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path().to_path_buf())?;
        assert!(store.get("users/../escape").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_if_absent_keeps_winner() -> Result<()> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path().to_path_buf())?;

        let first = serde_json::json!({ "task": "first" });
        let second = serde_json::json!({ "task": "second" });
        assert_eq!(store.create_if_absent("users/u1/tasks/d", first.clone()).await?, first);
        // The second writer loses and observes the first document
        assert_eq!(store.create_if_absent("users/u1/tasks/d", second).await?, first);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_or_create_generates_once() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(FileStore::new(dir.path().to_path_buf())?);
        let model = fake_model(Some("Dance for two minutes!"));
        let tasks = TaskStore::new(store, model.clone());
        let today = date(2025, 3, 1);

        let created = tasks.get_or_create_today_task("u1", "Subash", today).await?;
        assert_eq!(created.task, "Dance for two minutes!");
        assert!(!created.completed);
        assert_eq!(created.date, today);

        let again = tasks.get_or_create_today_task("u1", "Subash", today).await?;
        assert_eq!(again.task, created.task);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_or_create_falls_back_when_model_fails() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(FileStore::new(dir.path().to_path_buf())?);
        let tasks = TaskStore::new(store, fake_model(None));

        let created = tasks.get_or_create_today_task("u1", "Subash", date(2025, 3, 1)).await?;
        assert!(created.task.contains("Gentle Task"));
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_profile_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(FileStore::new(dir.path().to_path_buf())?);
        let tasks = TaskStore::new(store.clone(), fake_model(Some("task")));

        let first = tasks.ensure_profile("u1", "Subash", "subash@example.com").await?;
        assert_eq!(first.display_name, "Subash");

        // A second sign-in keeps the original record
        let second = tasks.ensure_profile("u1", "Someone Else", "other@example.com").await?;
        assert_eq!(second, first);

        // The streak counter starts zeroed
        let streak = tasks.current_streak("u1").await?;
        assert_eq!(streak.current_streak, 0);
        assert_eq!(streak.last_updated, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_streak_transitions() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(FileStore::new(dir.path().to_path_buf())?);
        let tasks = TaskStore::new(store, fake_model(Some("task")));

        // First completion starts the streak at 1
        let s = tasks.mark_completion("u1", date(2025, 3, 1), true).await?;
        assert_eq!(s.current_streak, 1);
        assert_eq!(s.last_updated, "2025-03-01");

        // The day immediately after increments
        let s = tasks.mark_completion("u1", date(2025, 3, 2), true).await?;
        assert_eq!(s.current_streak, 2);

        // A gap restarts at 1
        let s = tasks.mark_completion("u1", date(2025, 3, 5), true).await?;
        assert_eq!(s.current_streak, 1);

        // Explicit non-completion resets to 0
        let s = tasks.mark_completion("u1", date(2025, 3, 6), false).await?;
        assert_eq!(s.current_streak, 0);

        // Completing the next day starts over at 1 (a reset is not a streak day)
        let s = tasks.mark_completion("u1", date(2025, 3, 7), true).await?;
        assert_eq!(s.current_streak, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_completion_updates_task_record() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(FileStore::new(dir.path().to_path_buf())?);
        let tasks = TaskStore::new(store.clone(), fake_model(Some("task")));
        let today = date(2025, 3, 1);

        tasks.get_or_create_today_task("u1", "Subash", today).await?;
        tasks.mark_completion("u1", today, true).await?;

        let doc = store.get("users/u1/tasks/2025-03-01").await?.unwrap();
        let task: DailyTask = serde_json::from_value(doc)?;
        assert!(task.completed);
        Ok(())
    }
}
