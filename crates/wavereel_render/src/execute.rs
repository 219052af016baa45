use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::{RenderError, Result};
use crate::tracker::{send_terminate, TempTracker};

/// Diagnostic lines kept for the failure report.
const TAIL_LINES: usize = 20;

// ---------------------------------------------------------------------------
// Render plan
// ---------------------------------------------------------------------------

/// A compiled ffmpeg invocation ready for execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderPlan {
    pub inputs: Vec<RenderInput>,
    /// Empty for plain transcodes.
    pub filter_graph: String,
    pub output_args: Vec<String>,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderInput {
    pub path: PathBuf,
    /// Options placed before this input's `-i`, e.g. `-loop 1`.
    pub pre_args: Vec<String>,
}

impl RenderInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pre_args: Vec::new(),
        }
    }

    /// Repeat a still image as a video stream.
    pub fn still(path: impl Into<PathBuf>) -> Self {
        Self::new(path).with_args(&["-loop", "1"])
    }

    /// Loop a clip for as long as the output needs it.
    pub fn looped(path: impl Into<PathBuf>) -> Self {
        Self::new(path).with_args(&["-stream_loop", "-1"])
    }

    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.pre_args.extend(args.iter().map(|a| a.to_string()));
        self
    }
}

/// Progress update during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderProgress {
    pub percent: f64,
    pub frame: u64,
    pub fps: f64,
    pub speed: String,
    pub eta_seconds: Option<f64>,
}

pub fn build_ffmpeg_args(plan: &RenderPlan) -> Vec<String> {
    let mut args = vec!["-y".to_string()];

    for input in &plan.inputs {
        args.extend(input.pre_args.iter().cloned());
        args.push("-i".to_string());
        args.push(input.path.to_string_lossy().to_string());
    }

    if !plan.filter_graph.is_empty() {
        args.push("-filter_complex".to_string());
        args.push(plan.filter_graph.clone());
    }

    args.extend(plan.output_args.iter().cloned());

    args.push(plan.output_path.to_string_lossy().to_string());

    args
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Receives the lifecycle of each run. Implemented by the CLI's progress bars.
pub trait ProgressSink: Send + Sync {
    /// `determinate` is false when no expected duration is known.
    fn start(&self, description: &str, determinate: bool);
    fn update(&self, progress: &RenderProgress);
    fn finish(&self, success: bool);
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _description: &str, _determinate: bool) {}
    fn update(&self, _progress: &RenderProgress) {}
    fn finish(&self, _success: bool) {}
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs external tools one at a time, registering each child with the
/// tracker so an interrupt can stop it.
#[derive(Clone)]
pub struct Executor {
    tracker: TempTracker,
    grace: Duration,
    sink: Arc<dyn ProgressSink>,
}

impl Executor {
    pub fn new(tracker: TempTracker, grace: Duration, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            tracker,
            grace,
            sink,
        }
    }

    pub fn tracker(&self) -> &TempTracker {
        &self.tracker
    }

    /// Execute a render plan with `ffmpeg`.
    pub async fn render(
        &self,
        ffmpeg: &Path,
        plan: &RenderPlan,
        description: &str,
        expected_duration: Option<f64>,
    ) -> Result<()> {
        let args = build_ffmpeg_args(plan);
        self.run(ffmpeg, &args, description, expected_duration).await
    }

    /// Run a long-lived tool, streaming its diagnostic output into progress
    /// updates. Non-zero exit yields [`RenderError::ToolFailed`] carrying the
    /// last diagnostic lines.
    pub async fn run(
        &self,
        program: &Path,
        args: &[String],
        description: &str,
        expected_duration: Option<f64>,
    ) -> Result<()> {
        if self.tracker.is_interrupted() {
            return Err(RenderError::Interrupted);
        }

        let tool = tool_name(program);
        tracing::debug!("{} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::spawn(&tool, e))?;

        let pid = child.id();
        if let Some(pid) = pid {
            self.tracker.set_running(pid);
        }
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderError::Io(std::io::Error::other("stderr not captured")))?;

        let determinate = expected_duration.is_some_and(|d| d > 0.0);
        self.sink.start(description, determinate);

        let mut monitor = StderrMonitor::new(expected_duration);
        let mut cancel = self.tracker.subscribe();

        let finished = tokio::select! {
            status = async {
                monitor.drain(stderr, self.sink.as_ref()).await;
                child.wait().await
            } => Some(status),
            Ok(_) = cancel.wait_for(|c| *c) => None,
        };

        let result = match finished {
            Some(Ok(status)) if status.success() => Ok(()),
            // The terminal delivers Ctrl+C to the child as well.
            Some(Ok(_)) if self.interrupted_after_failure().await => Err(RenderError::Interrupted),
            Some(Ok(status)) => Err(RenderError::ToolFailed {
                tool: tool.clone(),
                status: status.to_string(),
                tail: monitor.tail(),
            }),
            Some(Err(e)) => Err(RenderError::Io(e)),
            None => {
                tracing::debug!("stopping {tool} after interrupt");
                stop_child(&mut child, pid, self.grace).await;
                Err(RenderError::Interrupted)
            }
        };

        if let Some(pid) = pid {
            self.tracker.clear_running(pid);
        }

        if result.is_ok() {
            self.sink.update(&monitor.completed());
        }
        self.sink.finish(result.is_ok());
        result
    }

    /// Run a short tool to completion and capture its output, killing it
    /// after `limit`.
    pub async fn run_captured(
        &self,
        program: &Path,
        args: &[String],
        limit: Duration,
    ) -> Result<Output> {
        if self.tracker.is_interrupted() {
            return Err(RenderError::Interrupted);
        }

        let tool = tool_name(program);
        tracing::debug!("{} {}", program.display(), args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RenderError::spawn(&tool, e))?;

        let pid = child.id();
        if let Some(pid) = pid {
            self.tracker.set_running(pid);
        }

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut cancel = self.tracker.subscribe();

        let finished = tokio::select! {
            output = tokio::time::timeout(limit, async {
                let (out, err) = tokio::join!(read_all(stdout.as_mut()), read_all(stderr.as_mut()));
                child.wait().await.map(|status| Output { status, stdout: out, stderr: err })
            }) => Some(output),
            Ok(_) = cancel.wait_for(|c| *c) => None,
        };

        let result = match finished {
            Some(Ok(Ok(output))) if output.status.success() => Ok(output),
            Some(Ok(Ok(_))) if self.interrupted_after_failure().await => Err(RenderError::Interrupted),
            Some(Ok(Ok(output))) => Err(RenderError::ToolFailed {
                tool,
                status: output.status.to_string(),
                tail: tail_of(&String::from_utf8_lossy(&output.stderr)),
            }),
            Some(Ok(Err(e))) => Err(RenderError::Io(e)),
            // Dropping the child on return kills it.
            Some(Err(_)) => Err(RenderError::Timeout(tool)),
            None => {
                tracing::debug!("stopping {tool} after interrupt");
                stop_child(&mut child, pid, self.grace).await;
                Err(RenderError::Interrupted)
            }
        };

        if let Some(pid) = pid {
            self.tracker.clear_running(pid);
        }
        result
    }

    /// A tool killed by the terminal's Ctrl+C can exit before the signal
    /// task records the interrupt; give that task a turn before judging.
    async fn interrupted_after_failure(&self) -> bool {
        tokio::task::yield_now().await;
        self.tracker.is_interrupted()
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("tracker", &self.tracker)
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

fn tool_name(program: &Path) -> String {
    program
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

async fn read_all<R: AsyncRead + Unpin>(stream: Option<&mut R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(stream) = stream {
        let _ = stream.read_to_end(&mut buf).await;
    }
    buf
}

/// Graceful terminate, then a forced kill once `grace` runs out.
async fn stop_child(child: &mut Child, pid: Option<u32>, grace: Duration) {
    let asked = pid.is_some_and(send_terminate);
    if asked && tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return;
    }
    if asked {
        tracing::warn!("child did not exit within {grace:?}, killing it");
    }
    let _ = child.kill().await;
}

fn tail_of(text: &str) -> String {
    let lines: Vec<&str> = text
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines[lines.len().saturating_sub(TAIL_LINES)..].join("\n")
}

// ---------------------------------------------------------------------------
// Diagnostic stream
// ---------------------------------------------------------------------------

/// Tracks the tail and monotonic progress of one run's stderr.
struct StderrMonitor {
    expected: Option<f64>,
    tail: VecDeque<String>,
    last: RenderProgress,
}

impl StderrMonitor {
    fn new(expected: Option<f64>) -> Self {
        Self {
            expected: expected.filter(|d| *d > 0.0),
            tail: VecDeque::with_capacity(TAIL_LINES),
            last: RenderProgress::default(),
        }
    }

    /// Read until EOF. ffmpeg rewrites its status line with `\r`, so both
    /// `\r` and `\n` end a line.
    async fn drain<R: AsyncRead + Unpin>(&mut self, stream: R, sink: &dyn ProgressSink) {
        let mut reader = BufReader::new(stream);
        let mut pending: Vec<u8> = Vec::new();

        loop {
            let buf = match reader.fill_buf().await {
                Ok(buf) if !buf.is_empty() => buf,
                _ => break,
            };
            let len = buf.len();
            for &byte in buf {
                if byte == b'\r' || byte == b'\n' {
                    if let Some(progress) = self.push_line(&pending) {
                        sink.update(&progress);
                    }
                    pending.clear();
                } else {
                    pending.push(byte);
                }
            }
            reader.consume(len);
        }

        if let Some(progress) = self.push_line(&pending) {
            sink.update(&progress);
        }
    }

    fn push_line(&mut self, raw: &[u8]) -> Option<RenderProgress> {
        let line = String::from_utf8_lossy(raw).trim().to_string();
        if line.is_empty() {
            return None;
        }

        let progress = self
            .expected
            .and_then(|total| parse_progress(&line, total))
            .map(|mut p| {
                p.percent = p.percent.max(self.last.percent);
                p
            });

        if self.tail.len() == TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line);

        if let Some(p) = &progress {
            self.last = p.clone();
        }
        progress
    }

    fn completed(&self) -> RenderProgress {
        RenderProgress {
            percent: 100.0,
            eta_seconds: Some(0.0),
            ..self.last.clone()
        }
    }

    fn tail(&self) -> String {
        self.tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Parse an ffmpeg stderr progress line.
///
/// Example line: `frame=  123 fps= 60 ... time=00:01:02.05 speed=1.50x`
pub fn parse_progress(line: &str, total_secs: f64) -> Option<RenderProgress> {
    if !line.contains("time=") {
        return None;
    }

    let frame = extract_value(line, "frame=")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = extract_value(line, "fps=")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0);

    let speed_str = extract_value(line, "speed=").unwrap_or_default();

    let time_secs = extract_value(line, "time=").and_then(|v| parse_time_str(&v))?;

    let percent = if total_secs > 0.0 {
        (time_secs * 100.0 / total_secs).min(100.0)
    } else {
        0.0
    };

    let speed_factor = speed_str
        .trim_end_matches('x')
        .parse::<f64>()
        .unwrap_or(0.0);

    let eta_seconds = if speed_factor > 0.0 && total_secs > time_secs {
        Some((total_secs - time_secs) / speed_factor)
    } else {
        None
    };

    Some(RenderProgress {
        percent,
        frame,
        fps,
        speed: speed_str,
        eta_seconds,
    })
}

/// Extract a value from an ffmpeg key=value progress line.
fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)? + key.len();
    let rest = &line[start..];
    let trimmed = rest.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace())
        .unwrap_or(trimmed.len());
    let val = trimmed[..end].to_string();
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// `HH:MM:SS.ff` to seconds.
fn parse_time_str(s: &str) -> Option<f64> {
    let mut parts = s.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        started: Mutex<Vec<(String, bool)>>,
        percents: Mutex<Vec<f64>>,
        finished: Mutex<Option<bool>>,
    }

    impl ProgressSink for RecordingSink {
        fn start(&self, description: &str, determinate: bool) {
            self.started
                .lock()
                .unwrap()
                .push((description.to_string(), determinate));
        }

        fn update(&self, progress: &RenderProgress) {
            self.percents.lock().unwrap().push(progress.percent);
        }

        fn finish(&self, success: bool) {
            *self.finished.lock().unwrap() = Some(success);
        }
    }

    #[test]
    fn build_ffmpeg_args_places_pre_args_before_each_input() {
        let plan = RenderPlan {
            inputs: vec![
                RenderInput::still("/tmp/cover.png"),
                RenderInput::new("/tmp/_tmp_audio.wav"),
                RenderInput::looped("/tmp/dust.mp4"),
            ],
            filter_graph: "[0:v]null[v]".to_string(),
            output_args: vec![
                "-map".to_string(),
                "[v]".to_string(),
                "-map".to_string(),
                "1:a".to_string(),
            ],
            output_path: PathBuf::from("/tmp/out.mp4"),
        };

        let args = build_ffmpeg_args(&plan);

        assert_eq!(
            args,
            vec![
                "-y",
                "-loop",
                "1",
                "-i",
                "/tmp/cover.png",
                "-i",
                "/tmp/_tmp_audio.wav",
                "-stream_loop",
                "-1",
                "-i",
                "/tmp/dust.mp4",
                "-filter_complex",
                "[0:v]null[v]",
                "-map",
                "[v]",
                "-map",
                "1:a",
                "/tmp/out.mp4",
            ]
        );
    }

    #[test]
    fn build_ffmpeg_args_omits_empty_graph() {
        let plan = RenderPlan {
            inputs: vec![RenderInput::new("/tmp/song.mp3")],
            filter_graph: String::new(),
            output_args: vec!["-ac".to_string(), "2".to_string()],
            output_path: PathBuf::from("/tmp/_tmp_audio.wav"),
        };
        let args = build_ffmpeg_args(&plan);
        assert!(!args.contains(&"-filter_complex".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/_tmp_audio.wav");
    }

    #[test]
    fn parse_progress_extracts_time_and_calculates_percent() {
        let line =
            "frame=  150 fps= 30 q=28.0 size=    1024kB time=00:00:05.00 bitrate= 200.0kbits/s speed=1.50x";
        let total_secs = 10.0;

        let progress = parse_progress(line, total_secs).unwrap();

        assert_eq!(progress.frame, 150);
        assert!((progress.fps - 30.0).abs() < 0.01);
        assert!((progress.percent - 50.0).abs() < 0.1);
        assert_eq!(progress.speed, "1.50x");
        // ETA: (10 - 5) / 1.5 = 3.33s
        assert!((progress.eta_seconds.unwrap() - 3.33).abs() < 0.1);
    }

    #[test]
    fn parse_progress_clamps_to_one_hundred() {
        let progress = parse_progress("time=00:00:12.00 speed=2x", 10.0).unwrap();
        assert!((progress.percent - 100.0).abs() < f64::EPSILON);
        assert!(progress.eta_seconds.is_none());
    }

    #[test]
    fn parse_progress_returns_none_for_non_progress_lines() {
        assert!(parse_progress("Input #0, mov,mp4...", 10.0).is_none());
        assert!(parse_progress("Stream #0:0: Video: h264", 10.0).is_none());
        assert!(parse_progress("", 10.0).is_none());
        assert!(parse_progress("time=N/A speed=N/A", 10.0).is_none());
    }

    #[test]
    fn parse_progress_handles_zero_total_duration() {
        let line = "frame=  10 fps= 30 time=00:00:01.00 speed=1.00x";
        let progress = parse_progress(line, 0.0).unwrap();
        assert!((progress.percent - 0.0).abs() < 0.01);
    }

    #[test]
    fn parse_time_str_valid() {
        assert!((parse_time_str("00:01:02.05").unwrap() - 62.05).abs() < 0.001);
        assert!((parse_time_str("01:00:00.00").unwrap() - 3600.0).abs() < 0.001);
        assert!((parse_time_str("00:00:00.00").unwrap() - 0.0).abs() < 0.001);
    }

    #[test]
    fn parse_time_str_invalid() {
        assert!(parse_time_str("invalid").is_none());
        assert!(parse_time_str("00:00").is_none());
        assert!(parse_time_str("00:00:01:00").is_none());
    }

    #[test]
    fn extract_value_works() {
        let line = "frame=  150 fps= 30.0 time=00:00:05.00 speed=1.50x";
        assert_eq!(extract_value(line, "frame=").unwrap(), "150");
        assert_eq!(extract_value(line, "fps=").unwrap(), "30.0");
        assert_eq!(extract_value(line, "time=").unwrap(), "00:00:05.00");
        assert_eq!(extract_value(line, "speed=").unwrap(), "1.50x");
        assert!(extract_value(line, "missing=").is_none());
    }

    #[test]
    fn monitor_progress_never_decreases() {
        let mut monitor = StderrMonitor::new(Some(10.0));
        let seen: Vec<f64> = ["time=00:00:02.00", "time=00:00:01.00", "noise", "time=00:00:06.00"]
            .iter()
            .filter_map(|l| monitor.push_line(l.as_bytes()))
            .map(|p| p.percent)
            .collect();
        assert_eq!(seen, vec![20.0, 20.0, 60.0]);
        assert!((monitor.completed().percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn monitor_keeps_only_recent_lines() {
        let mut monitor = StderrMonitor::new(None);
        for i in 0..30 {
            assert!(monitor.push_line(format!("line {i}").as_bytes()).is_none());
        }
        monitor.push_line(b"   ");
        let tail = monitor.tail();
        assert_eq!(tail.lines().count(), TAIL_LINES);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[test]
    fn tail_of_splits_carriage_returns() {
        assert_eq!(tail_of("a\rb\r\n\nc"), "a\nb\nc");
        assert_eq!(tail_of(""), "");
    }

    #[tokio::test]
    async fn missing_program_is_tool_not_found() {
        let exec = Executor::new(TempTracker::new(), Duration::from_secs(1), Arc::new(NoProgress));
        let err = exec
            .run(Path::new("/nonexistent/wavereel-ffmpeg"), &[], "encode", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::ToolNotFound(t) if t == "wavereel-ffmpeg"));
    }

    #[tokio::test]
    async fn interrupted_tracker_refuses_to_spawn() {
        let tracker = TempTracker::new();
        tracker.interrupt();
        let exec = Executor::new(tracker, Duration::from_secs(1), Arc::new(NoProgress));
        let err = exec
            .run_captured(Path::new("sh"), &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_interrupt());
    }

    #[tokio::test]
    async fn failure_rechecks_interrupt_after_signal_task_runs() {
        let tracker = TempTracker::new();
        let exec = Executor::new(tracker.clone(), Duration::from_secs(1), Arc::new(NoProgress));

        let trigger = tracker.clone();
        tokio::spawn(async move { trigger.interrupt() });

        assert!(!tracker.is_interrupted());
        assert!(exec.interrupted_after_failure().await);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::testutil::fake_tool;
        use std::time::Instant;
        use tempfile::TempDir;

        #[tokio::test]
        async fn run_reports_progress_split_on_carriage_returns() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(
                dir.path(),
                "ffmpeg",
                r"printf 'frame=1 time=00:00:01.00 speed=1x\r' >&2
printf 'frame=2 time=00:00:00.50 speed=1x\r' >&2
printf 'frame=3 time=00:00:03.00 speed=1x\n' >&2",
            );
            let sink = Arc::new(RecordingSink::default());
            let tracker = TempTracker::new();
            let exec = Executor::new(tracker.clone(), Duration::from_secs(1), sink.clone());

            exec.run(&tool, &[], "compose", Some(4.0)).await.unwrap();

            assert_eq!(*sink.percents.lock().unwrap(), vec![25.0, 25.0, 75.0, 100.0]);
            assert_eq!(
                *sink.started.lock().unwrap(),
                vec![("compose".to_string(), true)]
            );
            assert_eq!(*sink.finished.lock().unwrap(), Some(true));
            assert_eq!(tracker.running(), None);
        }

        #[tokio::test]
        async fn run_failure_carries_diagnostic_tail() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(
                dir.path(),
                "ffmpeg",
                "i=0; while [ $i -lt 25 ]; do echo \"diag $i\" >&2; i=$((i+1)); done; exit 3",
            );
            let sink = Arc::new(RecordingSink::default());
            let exec = Executor::new(TempTracker::new(), Duration::from_secs(1), sink.clone());

            let err = exec.run(&tool, &[], "compose", None).await.unwrap_err();
            match err {
                RenderError::ToolFailed { tool, tail, .. } => {
                    assert_eq!(tool, "ffmpeg");
                    assert_eq!(tail.lines().count(), TAIL_LINES);
                    assert!(tail.starts_with("diag 5"));
                    assert!(tail.ends_with("diag 24"));
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(*sink.finished.lock().unwrap(), Some(false));
        }

        #[tokio::test]
        async fn interrupt_terminates_running_child() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(dir.path(), "ffmpeg", "exec sleep 30");
            let tracker = TempTracker::new();
            let exec = Executor::new(tracker.clone(), Duration::from_millis(500), Arc::new(NoProgress));

            let trigger = tracker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                trigger.interrupt();
            });

            let started = Instant::now();
            let err = exec.run(&tool, &[], "compose", Some(30.0)).await.unwrap_err();
            assert!(err.is_interrupt());
            assert!(started.elapsed() < Duration::from_secs(5));
            assert_eq!(tracker.running(), None);
        }

        #[tokio::test]
        async fn run_captured_returns_output() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(dir.path(), "ffprobe", "echo out; echo err >&2");
            let exec = Executor::new(TempTracker::new(), Duration::from_secs(1), Arc::new(NoProgress));

            let output = exec
                .run_captured(&tool, &[], Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
            assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "err");
        }

        #[tokio::test]
        async fn run_captured_times_out() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(dir.path(), "magick", "exec sleep 30");
            let tracker = TempTracker::new();
            let exec = Executor::new(tracker.clone(), Duration::from_secs(1), Arc::new(NoProgress));

            let err = exec
                .run_captured(&tool, &[], Duration::from_millis(200))
                .await
                .unwrap_err();
            assert!(matches!(err, RenderError::Timeout(t) if t == "magick"));
            assert_eq!(tracker.running(), None);
        }

        #[tokio::test]
        async fn run_captured_interrupt_terminates_gracefully() {
            let dir = TempDir::new().unwrap();
            let marker = dir.path().join("terminated");
            let tool = fake_tool(
                dir.path(),
                "magick",
                r#"trap 'echo bye > "$1"; kill $!; exit 0' TERM
sleep 30 &
wait"#,
            );
            let tracker = TempTracker::new();
            let exec = Executor::new(tracker.clone(), Duration::from_secs(2), Arc::new(NoProgress));

            let trigger = tracker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                trigger.interrupt();
            });

            let args = vec![marker.to_string_lossy().into_owned()];
            let err = exec
                .run_captured(&tool, &args, Duration::from_secs(10))
                .await
                .unwrap_err();
            assert!(err.is_interrupt());
            assert!(marker.is_file());
            assert_eq!(tracker.running(), None);
        }

        #[tokio::test]
        async fn run_captured_failure_is_tool_failed() {
            let dir = TempDir::new().unwrap();
            let tool = fake_tool(dir.path(), "ffprobe", "echo 'bad input' >&2; exit 1");
            let exec = Executor::new(TempTracker::new(), Duration::from_secs(1), Arc::new(NoProgress));

            let err = exec
                .run_captured(&tool, &[], Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(matches!(err, RenderError::ToolFailed { tail, .. } if tail == "bad input"));
        }
    }
}
