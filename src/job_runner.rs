use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref CANCEL_FLAGS: Mutex<HashMap<i64, Arc<AtomicBool>>> = Mutex::new(HashMap::new());
}

/// Generalizes the lazy_static job-registry pattern used elsewhere in this
/// codebase (one `AtomicBool` cancellation flag per running job) into a
/// registry keyed by job id rather than a single global slot, since
/// multiple versions may have independent validate/publish/rollback jobs
/// in flight at once. "At most one non-terminal job per version" is
/// enforced at the database layer (`version_store::create_job`); this
/// registry only tracks cooperative cancellation for jobs once they start.
pub struct JobHandle {
    job_id: i64,
    cancel_flag: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        CANCEL_FLAGS.lock().unwrap().remove(&self.job_id);
    }
}

pub fn register(job_id: i64) -> JobHandle {
    let flag = Arc::new(AtomicBool::new(false));
    CANCEL_FLAGS.lock().unwrap().insert(job_id, flag.clone());
    JobHandle {
        job_id,
        cancel_flag: flag,
    }
}

/// Requests cancellation of a running job. Returns `false` if no job with
/// this id is currently registered (already finished, or never started).
pub fn request_cancel(job_id: i64) -> bool {
    match CANCEL_FLAGS.lock().unwrap().get(&job_id) {
        Some(flag) => {
            flag.store(true, Ordering::SeqCst);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_handle_is_not_cancelled() {
        let handle = register(1);
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_request_cancel_marks_handle_cancelled() {
        let handle = register(2);
        assert!(request_cancel(2));
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_request_cancel_on_unknown_job_returns_false() {
        assert!(!request_cancel(999));
    }

    #[test]
    fn test_dropping_handle_removes_registry_entry() {
        {
            let _handle = register(3);
            assert!(request_cancel(3));
        }
        assert!(!request_cancel(3));
    }
}
