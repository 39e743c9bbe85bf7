//! Face model backed by a long-lived detector process.
//!
//! The detector reads commands on stdin and answers on stdout:
//!
//! ```text
//! DETECT <w> <h>\n<w*h*3 RGB bytes>   ->  <n>\n then n lines "x0 y0 x1 y1"
//! LANDMARKS <x0> <y0> <x1> <y1>\n     ->  one line of 2*K floats
//! QUIT\n
//! ```

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;

use super::{DetectError, FaceBox, FaceModel, FaceModelFactory};
use crate::config::DetectionSettings;
use crate::models::Keypoints;

/// Client side of the detector line protocol.
pub struct ExternalModel {
    program: String,
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ExternalModel {
    /// Start a detector process from the `[detection]` settings.
    pub fn spawn(settings: &DetectionSettings) -> Result<Self, DetectError> {
        let mut cmd = Command::new(&settings.program);
        cmd.args(&settings.args);
        if !settings.face_model.is_empty() {
            cmd.arg("--face-model").arg(&settings.face_model);
        }
        if !settings.landmark_model.is_empty() {
            cmd.arg("--landmark-model").arg(&settings.landmark_model);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        tracing::debug!("[Detect] Starting detector: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|source| DetectError::Spawn {
            program: settings.program.clone(),
            source,
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DetectError::Protocol(
                "failed to capture detector pipes".to_string(),
            ));
        };

        Ok(Self {
            program: settings.program.clone(),
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
        })
    }

    fn read_reply(&mut self) -> Result<String, DetectError> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(DetectError::Protocol(format!(
                "{} closed its output",
                self.program
            )));
        }
        Ok(line.trim().to_string())
    }
}

fn parse_floats(line: &str) -> Result<Vec<f64>, DetectError> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| DetectError::Protocol(format!("not a number: '{}'", tok)))
        })
        .collect()
}

/// Parse one `x0 y0 x1 y1` line.
pub(crate) fn parse_face_line(line: &str) -> Result<FaceBox, DetectError> {
    match parse_floats(line)?.as_slice() {
        &[left, top, right, bottom] => Ok(FaceBox::new(left, top, right, bottom)),
        other => Err(DetectError::Protocol(format!(
            "face box needs 4 values, got {}",
            other.len()
        ))),
    }
}

impl FaceModel for ExternalModel {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>, DetectError> {
        writeln!(self.stdin, "DETECT {} {}", frame.width(), frame.height())?;
        self.stdin.write_all(frame.as_raw())?;
        self.stdin.flush()?;

        let header = self.read_reply()?;
        let count: usize = header
            .parse()
            .map_err(|_| DetectError::Protocol(format!("bad face count: '{}'", header)))?;

        let mut faces = Vec::with_capacity(count);
        for _ in 0..count {
            let line = self.read_reply()?;
            faces.push(parse_face_line(&line)?);
        }
        Ok(faces)
    }

    fn landmarks(&mut self, face: &FaceBox) -> Result<Keypoints, DetectError> {
        writeln!(
            self.stdin,
            "LANDMARKS {} {} {} {}",
            face.left, face.top, face.right, face.bottom
        )?;
        self.stdin.flush()?;

        let line = self.read_reply()?;
        let values = parse_floats(&line)?;
        Keypoints::from_flat(&values).ok_or_else(|| {
            DetectError::Protocol(format!("odd number of landmark values ({})", values.len()))
        })
    }
}

impl Drop for ExternalModel {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "QUIT");
        let _ = self.stdin.flush();
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                // Give the detector a moment to exit on its own
                std::thread::sleep(std::time::Duration::from_millis(50));
                if !matches!(self.child.try_wait(), Ok(Some(_))) {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                }
            }
        }
    }
}

/// Spawns [`ExternalModel`] processes.
#[derive(Debug, Clone)]
pub struct ExternalModelFactory {
    settings: DetectionSettings,
}

impl ExternalModelFactory {
    pub fn new(settings: DetectionSettings) -> Self {
        Self { settings }
    }
}

impl FaceModelFactory for ExternalModelFactory {
    fn name(&self) -> &str {
        &self.settings.program
    }

    fn create(&self) -> Result<Box<dyn FaceModel>, DetectError> {
        Ok(Box::new(ExternalModel::spawn(&self.settings)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_face_lines() {
        assert_eq!(
            parse_face_line("1 2 30.5 40").unwrap(),
            FaceBox::new(1.0, 2.0, 30.5, 40.0)
        );
        assert!(parse_face_line("1 2 3").is_err());
        assert!(parse_face_line("a b c d").is_err());
    }

    #[test]
    fn spawn_missing_program_fails() {
        let settings = DetectionSettings {
            program: "/nonexistent/face-landmarker".to_string(),
            ..DetectionSettings::default()
        };
        assert!(matches!(
            ExternalModel::spawn(&settings),
            Err(DetectError::Spawn { .. })
        ));
    }
}
