// UI layer: drives each action against a `SampleApi`, prints the progress
// timeline on stdout and shows a spinner while the service is working.

use crate::api::{decode_payload, ActionState, SampleAction, SampleApi, SampleMetadata};
use crate::capture::{detect_file, human_size};
use crate::config::ui_sample_link;
use crate::error::ApiError;
use crate::output::{write_json, E2eReport, Timeline};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Consecutive failed status checks tolerated before giving up.
const MAX_POLL_ERRORS: u32 = 5;

fn spinner(message: &str) -> ProgressBar {
    if !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Status-check failures worth retrying on the next tick.
fn is_transient(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::Malformed(_) | ApiError::Service(_) | ApiError::Status { .. }
    )
}

/// Poll sample metadata until the service reports a traffic date.
pub fn wait_for_processing(
    api: &dyn SampleApi,
    sample_id: &str,
    interval: Duration,
) -> Result<SampleMetadata> {
    let spinner = spinner("Waiting for NetworkSage to process the sample");
    let mut errors = 0;
    let result = loop {
        thread::sleep(interval);
        match api.sample_metadata(sample_id) {
            Ok(Some(meta)) if meta.is_processed() => break Ok(meta),
            Ok(_) => {
                errors = 0;
                debug!(sample_id, "sample not processed yet");
            }
            Err(e) if is_transient(&e) && errors + 1 < MAX_POLL_ERRORS => {
                errors += 1;
                warn!(sample_id, error = %e, "status check failed, retrying");
            }
            Err(e) => {
                let err = anyhow::Error::new(e);
                break Err(err.context("Failed while waiting for sample processing"));
            }
        }
    };
    spinner.finish_and_clear();
    result
}

/// Poll an action until its status is `generated`, returning the decoded
/// payload.
pub fn wait_for_action(
    api: &dyn SampleApi,
    sample_id: &str,
    action: SampleAction,
    interval: Duration,
) -> Result<Value> {
    let spinner = spinner(&format!("Waiting for {}", action));
    let mut errors = 0;
    let result = loop {
        thread::sleep(interval);
        match api.fetch_action(sample_id, action) {
            Ok(ActionState::Generated(payload)) => {
                break decode_payload(payload)
                    .with_context(|| format!("Something failed while loading {}", action));
            }
            Ok(ActionState::Pending(status)) => {
                errors = 0;
                let status = status.as_deref().unwrap_or("-");
                debug!(sample_id, %action, status, "not generated yet");
            }
            Err(e) if is_transient(&e) && errors + 1 < MAX_POLL_ERRORS => {
                errors += 1;
                warn!(sample_id, %action, error = %e, "status check failed, retrying");
            }
            Err(e) => {
                let err = anyhow::Error::new(e);
                break Err(err.context(format!("Failed while waiting for {}", action)));
            }
        }
    };
    spinner.finish_and_clear();
    result
}

/// Request generation of `action` and wait for it.
pub fn generate(
    api: &dyn SampleApi,
    sample_id: &str,
    action: SampleAction,
    interval: Duration,
) -> Result<Value> {
    api.request_action(sample_id, action)
        .with_context(|| format!("Something went wrong while requesting sample {}", action))?;
    wait_for_action(api, sample_id, action, interval)
}

/// Fetch `action` for an existing sample, requesting it first when the
/// service has not generated it yet.
pub fn fetch_existing(
    api: &dyn SampleApi,
    sample_id: &str,
    action: SampleAction,
    interval: Duration,
) -> Result<Value> {
    match api.fetch_action(sample_id, action) {
        Ok(ActionState::Generated(payload)) => {
            return decode_payload(payload)
                .with_context(|| format!("Something failed while loading {}", action));
        }
        Ok(ActionState::Pending(_)) => {}
        Err(e) if is_transient(&e) => debug!(sample_id, error = %e, "lookup failed"),
        Err(e) => return Err(e).with_context(|| format!("Failed to look up {}", action)),
    }
    println!("Looks like {} did not exist for {}. Requesting now.", action, sample_id);
    generate(api, sample_id, action, interval)
}

/// `categorization` / `summary`: look up an existing sample and store the
/// result as JSON.
pub fn run_lookup(
    api: &dyn SampleApi,
    action: SampleAction,
    sample_id: &str,
    output: &Path,
    interval: Duration,
) -> Result<Value> {
    let data = fetch_existing(api, sample_id, action, interval)?;
    write_json(output, &data)?;
    println!(
        "Successfully retrieved {}! Data stored at {}",
        action,
        output.display()
    );
    Ok(data)
}

/// `e2e`: upload a capture, wait for processing, summarize, and write the
/// Markdown report.
pub fn run_e2e(
    api: &dyn SampleApi,
    file: &Path,
    output: &Path,
    interval: Duration,
) -> Result<E2eReport> {
    e2e_with_timeline(api, file, output, interval, &mut Timeline::start())
}

fn e2e_with_timeline<W: Write>(
    api: &dyn SampleApi,
    file: &Path,
    output: &Path,
    interval: Duration,
    timeline: &mut Timeline<W>,
) -> Result<E2eReport> {
    timeline.mark("Beginning process");

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let detection = detect_file(file)?;
    let Some(kind) = detection.kind else {
        bail!(
            "{}, of type {} is not an accepted file type.",
            file_name,
            detection.description
        );
    };
    let size = std::fs::metadata(file)
        .with_context(|| format!("Failed to stat {}", file.display()))?
        .len();
    let file_size = human_size(size);
    timeline.mark(format!(
        "Detected {} ({}, {}). Uploading to NetworkSage",
        kind, detection.description, file_size
    ));

    let sample_id = api
        .upload_sample(file, kind)
        .context("Something went wrong while uploading")?;
    timeline.mark("Upload complete! Beginning processing.");

    wait_for_processing(api, &sample_id, interval)?;
    let link = ui_sample_link(&sample_id);
    timeline.mark(format!("Processing complete! Sample can be viewed at {}.", link));

    timeline.mark("Beginning sample summarization.");
    let summary = generate(api, &sample_id, SampleAction::Summary, interval)
        .context("Something went wrong while getting summary")?;
    // Printed only once the report is on disk.
    let done = timeline.record(format!("Summary complete! Data stored at {}", output.display()));

    let report = E2eReport {
        file_name,
        file_kind: kind.to_string(),
        file_size,
        sample_id,
        sample_link: link,
        generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        steps: timeline.steps().to_vec(),
        total: timeline.elapsed(),
        summary,
    };
    report.write(output).with_context(|| {
        format!("Something went wrong while writing output to {}", output.display())
    })?;
    timeline.print(&done);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockSampleApi;
    use crate::capture::SampleKind;
    use mockall::Sequence;
    use serde_json::json;
    use std::fs;

    const NO_WAIT: Duration = Duration::ZERO;

    fn processed() -> SampleMetadata {
        SampleMetadata {
            date_created: "01/02/2024 10:00:00".into(),
            file_name: "cap.sf".into(),
            traffic_date: json!("1706781234.5"),
        }
    }

    fn summary_json() -> Value {
        json!({
            "verdict": "Malicious",
            "confidence": "High",
            "summary": "Beaconing",
            "details": "Regular callbacks"
        })
    }

    fn write_pcap(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("capture.pcap");
        let mut bytes = vec![0xD4, 0xC3, 0xB2, 0xA1, 0x02, 0x00, 0x04, 0x00];
        bytes.resize(2048, 0);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn existing_categorization_is_written_as_json() {
        let mut api = MockSampleApi::new();
        api.expect_fetch_action()
            .withf(|id, action| id == "abc" && *action == SampleAction::Categorization)
            .times(1)
            .returning(|_, _| Ok(ActionState::Generated(json!("{\"category\": \"web\"}"))));
        api.expect_request_action().never();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cat.json");
        let data = run_lookup(&api, SampleAction::Categorization, "abc", &out, NO_WAIT).unwrap();
        assert_eq!(data, json!({"category": "web"}));

        let written: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written, json!({"category": "web"}));
    }

    #[test]
    fn missing_summary_is_requested_then_polled() {
        let mut api = MockSampleApi::new();
        let mut seq = Sequence::new();
        api.expect_fetch_action()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ApiError::Malformed("no summary".into())));
        api.expect_request_action()
            .withf(|id, action| id == "abc" && *action == SampleAction::Summary)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_fetch_action()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ActionState::Pending(Some("generating".into()))));
        api.expect_fetch_action()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ActionState::Generated(summary_json())));

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("summary.json");
        let data = run_lookup(&api, SampleAction::Summary, "abc", &out, NO_WAIT).unwrap();
        assert_eq!(data, summary_json());
    }

    #[test]
    fn transport_failure_on_lookup_is_fatal() {
        let mut api = MockSampleApi::new();
        api.expect_fetch_action().times(1).returning(|_, _| {
            Err(ApiError::Io {
                path: "x".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
            })
        });
        api.expect_request_action().never();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");
        assert!(run_lookup(&api, SampleAction::Summary, "abc", &out, NO_WAIT).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn polling_gives_up_after_repeated_errors() {
        let mut api = MockSampleApi::new();
        api.expect_fetch_action()
            .times(MAX_POLL_ERRORS as usize)
            .returning(|_, _| Err(ApiError::Service("still broken".into())));

        let err = wait_for_action(&api, "abc", SampleAction::Summary, NO_WAIT).unwrap_err();
        assert!(format!("{:#}", err).contains("still broken"));
    }

    #[test]
    fn undecodable_payload_is_an_error() {
        let mut api = MockSampleApi::new();
        api.expect_fetch_action()
            .returning(|_, _| Ok(ActionState::Generated(json!("<<not json>>"))));

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");
        assert!(run_lookup(&api, SampleAction::Categorization, "abc", &out, NO_WAIT).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn processing_waits_for_traffic_date() {
        let mut api = MockSampleApi::new();
        let mut seq = Sequence::new();
        api.expect_sample_metadata()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        api.expect_sample_metadata()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(Some(SampleMetadata {
                    traffic_date: json!(""),
                    ..SampleMetadata::default()
                }))
            });
        api.expect_sample_metadata()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(processed())));

        let meta = wait_for_processing(&api, "abc", NO_WAIT).unwrap();
        assert!(meta.is_processed());
    }

    #[test]
    fn e2e_uploads_summarizes_and_writes_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let capture = write_pcap(dir.path());
        let out = dir.path().join("report.md");

        let mut api = MockSampleApi::new();
        api.expect_upload_sample()
            .withf(|path, kind| path.ends_with("capture.pcap") && *kind == SampleKind::Pcap)
            .times(1)
            .returning(|_, _| Ok("sample-1".into()));
        api.expect_sample_metadata()
            .withf(|id| id == "sample-1")
            .returning(|_| Ok(Some(processed())));
        api.expect_request_action()
            .withf(|id, action| id == "sample-1" && *action == SampleAction::Summary)
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_fetch_action()
            .returning(|_, _| Ok(ActionState::Generated(json!(summary_json().to_string()))));

        let report = run_e2e(&api, &capture, &out, NO_WAIT).unwrap();
        assert_eq!(report.sample_id, "sample-1");
        assert_eq!(report.file_size, "2.00 KB");

        let md = fs::read_to_string(&out).unwrap();
        assert!(md.contains("**Verdict:** Malicious"));
        assert!(md.contains("https://networksage.seclarity.io/samples/sample-1"));
        assert!(md.contains("s | Beginning process |"));
        assert!(md.contains("- **Elapsed:** "));

        let start = md.find("```json\n").unwrap() + "```json\n".len();
        let end = md[start..].find("\n```").unwrap() + start;
        let parsed: Value = serde_json::from_str(&md[start..end]).unwrap();
        assert_eq!(parsed, summary_json());
    }

    #[test]
    fn e2e_rejects_unknown_file_type_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firmware.bin");
        fs::write(&path, [0x7F, b'E', b'L', b'F', 2, 1, 1, 0]).unwrap();
        let out = dir.path().join("report.md");

        let mut api = MockSampleApi::new();
        api.expect_upload_sample().never();

        let err = run_e2e(&api, &path, &out, NO_WAIT).unwrap_err();
        assert!(err.to_string().contains("is not an accepted file type"));
        assert!(!out.exists());
    }

    #[test]
    fn e2e_upload_failure_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let capture = write_pcap(dir.path());
        let out = dir.path().join("report.md");

        let mut api = MockSampleApi::new();
        api.expect_upload_sample()
            .returning(|_, _| Err(ApiError::Service("quota exceeded".into())));
        api.expect_sample_metadata().never();

        let err = run_e2e(&api, &capture, &out, NO_WAIT).unwrap_err();
        assert!(format!("{:#}", err).contains("quota exceeded"));
        assert!(!out.exists());
    }

    fn e2e_mock() -> MockSampleApi {
        let mut api = MockSampleApi::new();
        api.expect_upload_sample().returning(|_, _| Ok("sample-1".into()));
        api.expect_sample_metadata().returning(|_| Ok(Some(processed())));
        api.expect_request_action().returning(|_, _| Ok(()));
        api.expect_fetch_action()
            .returning(|_, _| Ok(ActionState::Generated(summary_json())));
        api
    }

    #[test]
    fn e2e_prints_completion_only_after_report_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let capture = write_pcap(dir.path());
        let out = dir.path().join("report.md");

        let mut timeline = Timeline::with_writer(Vec::new());
        e2e_with_timeline(&e2e_mock(), &capture, &out, NO_WAIT, &mut timeline).unwrap();

        let printed = String::from_utf8_lossy(timeline.writer()).into_owned();
        let last = printed.lines().last().unwrap();
        assert!(last.ends_with(&format!("Summary complete! Data stored at {}", out.display())));
    }

    #[test]
    fn e2e_write_failure_does_not_claim_success() {
        let dir = tempfile::tempdir().unwrap();
        let capture = write_pcap(dir.path());
        let out = dir.path().join("missing_dir").join("r.md");

        let mut timeline = Timeline::with_writer(Vec::new());
        let err = e2e_with_timeline(&e2e_mock(), &capture, &out, NO_WAIT, &mut timeline)
            .unwrap_err();
        assert!(err.to_string().contains("Something went wrong while writing output"));

        let printed = String::from_utf8_lossy(timeline.writer()).into_owned();
        assert!(printed.contains("Beginning sample summarization."));
        assert!(!printed.contains("Summary complete!"));
        assert!(!out.exists());
    }

    #[test]
    fn action_polling_recovers_from_transient_errors() {
        let mut api = MockSampleApi::new();
        let mut seq = Sequence::new();
        api.expect_fetch_action()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ApiError::Malformed("truncated body".into())));
        api.expect_fetch_action()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Err(ApiError::Status {
                    url: "u".into(),
                    status: 502,
                    body: "bad gateway".into(),
                })
            });
        api.expect_fetch_action()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ActionState::Generated(summary_json())));

        let data = wait_for_action(&api, "abc", SampleAction::Summary, NO_WAIT).unwrap();
        assert_eq!(data, summary_json());
    }

    #[test]
    fn pending_response_resets_the_error_budget() {
        let budget = (MAX_POLL_ERRORS - 1) as usize;
        let mut api = MockSampleApi::new();
        let mut seq = Sequence::new();
        api.expect_fetch_action()
            .times(budget)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ApiError::Service("busy".into())));
        api.expect_fetch_action()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ActionState::Pending(Some("generating".into()))));
        api.expect_fetch_action()
            .times(budget)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ApiError::Service("busy".into())));
        api.expect_fetch_action()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ActionState::Generated(summary_json())));

        let data = wait_for_action(&api, "abc", SampleAction::Summary, NO_WAIT).unwrap();
        assert_eq!(data, summary_json());
    }

    #[test]
    fn processing_polling_recovers_from_transient_errors() {
        let mut api = MockSampleApi::new();
        let mut seq = Sequence::new();
        api.expect_sample_metadata()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(ApiError::Status {
                    url: "u".into(),
                    status: 503,
                    body: "unavailable".into(),
                })
            });
        api.expect_sample_metadata()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ApiError::Malformed("half a response".into())));
        api.expect_sample_metadata()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        api.expect_sample_metadata()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(processed())));

        let meta = wait_for_processing(&api, "abc", NO_WAIT).unwrap();
        assert_eq!(meta, processed());
    }
}
