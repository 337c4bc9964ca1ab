mod job_progress;
mod sanitize;
mod synthesis;
