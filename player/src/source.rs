use std::path::{Path, PathBuf};

use anyhow::Context;
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, OutputVideoFrame};
use glyphcast_core::frame::PixelGrid;

use crate::error::PlayerError;

/// What the decoder reports about a source before the first frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SourceMeta {
    /// 0 when unknown.
    pub fps: f64,
    /// Estimated from duration and fps; 0 when unknown (live sources).
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

impl SourceMeta {
    pub fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// A stream of decoded frames.
pub trait FrameSource {
    fn meta(&self) -> SourceMeta;

    /// Next frame, or `None` at end of stream or on a read failure.
    fn read_frame(&mut self) -> Option<PixelGrid>;

    /// Start over from the first frame.
    fn restart(&mut self) -> anyhow::Result<()>;
}

/// A running ffmpeg process emitting rgb24 frames.
struct FfmpegStream {
    child: FfmpegChild,
    events: Box<dyn Iterator<Item = FfmpegEvent>>,
    pending: Option<OutputVideoFrame>,
    meta: SourceMeta,
    ended: bool,
}

impl FfmpegStream {
    /// Spawn ffmpeg and read events up to the first frame, collecting
    /// stream metadata on the way.
    fn spawn(command: &mut FfmpegCommand) -> anyhow::Result<Self> {
        let mut child = command
            .rawvideo()
            .spawn()
            .context("failed to spawn ffmpeg, is it installed?")?;

        let mut events = child.iter().context("failed to iterate ffmpeg events")?;

        let mut meta = SourceMeta::default();
        let mut duration = 0.0;
        let mut last_error = None;
        let mut first_frame = None;

        for event in &mut events {
            match event {
                FfmpegEvent::ParsedInputStream(stream) => {
                    if let Some(video) = stream.video_data() {
                        meta.fps = video.fps as f64;
                        meta.width = video.width;
                        meta.height = video.height;
                    }
                }
                FfmpegEvent::ParsedDuration(d) => duration = d.duration,
                FfmpegEvent::Error(e) => last_error = Some(e),
                FfmpegEvent::OutputFrame(frame) => {
                    first_frame = Some(frame);
                    break;
                }
                _ => {}
            }
        }

        let Some(frame) = first_frame else {
            let _ = child.kill();
            anyhow::bail!(last_error.unwrap_or_else(|| "no video frames decoded".to_string()));
        };

        if meta.width == 0 || meta.height == 0 {
            meta.width = frame.width;
            meta.height = frame.height;
        }
        if meta.fps > 0.0 && duration > 0.0 {
            meta.frame_count = (duration * meta.fps).round() as u64;
        }
        log::debug!("ffmpeg stream ready: {meta:?}");

        Ok(Self {
            child,
            events: Box::new(events),
            pending: Some(frame),
            meta,
            ended: false,
        })
    }

    fn next_frame(&mut self) -> Option<PixelGrid> {
        let next = self.pending.take().or_else(|| {
            self.events.by_ref().find_map(|event| match event {
                FfmpegEvent::OutputFrame(frame) => Some(frame),
                _ => None,
            })
        });
        let Some(frame) = next else {
            self.ended = true;
            return None;
        };
        match PixelGrid::from_rgb24(frame.width, frame.height, frame.data) {
            Ok(grid) => Some(grid),
            Err(e) => {
                log::warn!("dropping malformed frame {}: {e:#}", frame.frame_num);
                None
            }
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A video file decoded by ffmpeg.
pub struct VideoSource {
    path: PathBuf,
    stream: FfmpegStream,
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self, PlayerError> {
        let target = path.display().to_string();
        let open_err = |reason: String| PlayerError::SourceOpen {
            target: target.clone(),
            reason,
        };

        if !path.is_file() {
            return Err(open_err("no such file".into()));
        }
        let stream = Self::spawn(path).map_err(|e| open_err(format!("{e:#}")))?;
        log::info!("opened {target}: {:?}", stream.meta);

        Ok(Self {
            path: path.to_path_buf(),
            stream,
        })
    }

    fn spawn(path: &Path) -> anyhow::Result<FfmpegStream> {
        let input = path.to_str().context("invalid input path")?;
        FfmpegStream::spawn(FfmpegCommand::new().input(input))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for VideoSource {
    fn meta(&self) -> SourceMeta {
        self.stream.meta
    }

    fn read_frame(&mut self) -> Option<PixelGrid> {
        self.stream.next_frame()
    }

    fn restart(&mut self) -> anyhow::Result<()> {
        log::debug!("restarting {}", self.path.display());
        self.stream = Self::spawn(&self.path)?;
        Ok(())
    }
}

/// Reads skipped after the n-th consecutive failed re-open, capped at 64
/// (about two seconds at the camera frame rate).
fn reopen_backoff(failures: u32) -> u32 {
    1 << failures.min(6)
}

/// A capture device read through ffmpeg's platform input.
///
/// Camera drop-outs are transient: when the capture process dies the device
/// is re-opened on a later read, backing off while it stays unavailable.
pub struct CameraSource {
    device: u32,
    stream: Option<FfmpegStream>,
    meta: SourceMeta,
    failed_reopens: u32,
    /// Reads left to skip before the next re-open attempt.
    cooldown: u32,
}

impl CameraSource {
    pub fn open(device: u32) -> Result<Self, PlayerError> {
        let stream = Self::spawn(device).map_err(|e| PlayerError::SourceOpen {
            target: format!("camera {device}"),
            reason: format!("{e:#}"),
        })?;
        log::info!("opened camera {device}: {:?}", stream.meta);

        Ok(Self {
            device,
            meta: stream.meta,
            stream: Some(stream),
            failed_reopens: 0,
            cooldown: 0,
        })
    }

    fn spawn(device: u32) -> anyhow::Result<FfmpegStream> {
        let mut command = FfmpegCommand::new();
        if cfg!(target_os = "linux") {
            command.format("v4l2").input(format!("/dev/video{device}"));
        } else if cfg!(target_os = "macos") {
            command
                .format("avfoundation")
                .args(["-framerate", "30"])
                .input(device.to_string());
        } else {
            // dshow addresses devices by name; "video=N" only works for numbered aliases.
            command.format("dshow").input(format!("video={device}"));
        }
        FfmpegStream::spawn(&mut command)
    }

    /// Bring the capture back after a drop-out. `false` while the device is
    /// still cooling down or failed to open again.
    fn reopen(&mut self) -> bool {
        if self.cooldown > 0 {
            self.cooldown -= 1;
            return false;
        }
        match self.restart() {
            Ok(()) => {
                log::info!("camera {} re-opened", self.device);
                true
            }
            Err(e) => {
                if self.failed_reopens == 0 {
                    log::warn!("camera {} unavailable: {e:#}", self.device);
                }
                self.failed_reopens += 1;
                self.cooldown = reopen_backoff(self.failed_reopens);
                log::debug!("camera {} retry in {} reads", self.device, self.cooldown);
                false
            }
        }
    }
}

impl FrameSource for CameraSource {
    fn meta(&self) -> SourceMeta {
        self.meta
    }

    fn read_frame(&mut self) -> Option<PixelGrid> {
        if self.stream.is_none() && !self.reopen() {
            return None;
        }

        let stream = self.stream.as_mut()?;
        let frame = stream.next_frame();
        if stream.ended {
            log::debug!("camera {} capture ended, re-opening on next read", self.device);
            self.stream = None;
        }
        frame
    }

    fn restart(&mut self) -> anyhow::Result<()> {
        self.stream = None;
        let stream = Self::spawn(self.device)?;
        self.meta = stream.meta;
        self.stream = Some(stream);
        self.failed_reopens = 0;
        self.cooldown = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_meta() {
        let meta = SourceMeta {
            fps: 25.0,
            frame_count: 250,
            width: 640,
            height: 360,
        };
        assert_eq!(meta.duration_secs(), 10.0);
        assert_eq!(SourceMeta::default().duration_secs(), 0.0);
    }

    #[test]
    fn missing_file_is_open_failure() {
        let err = VideoSource::open(Path::new("/definitely/not/here.mp4"))
            .err()
            .unwrap();
        assert!(matches!(err, PlayerError::SourceOpen { .. }));
        assert!(err.to_string().contains("not/here.mp4"));
    }

    #[test]
    fn reopen_backoff_grows_and_caps() {
        assert_eq!(reopen_backoff(1), 2);
        assert_eq!(reopen_backoff(3), 8);
        assert_eq!(reopen_backoff(6), 64);
        assert_eq!(reopen_backoff(40), 64);
    }

    #[test]
    fn lost_camera_skips_reads_while_cooling_down() {
        let mut camera = CameraSource {
            device: 9,
            stream: None,
            meta: SourceMeta::default(),
            failed_reopens: 3,
            cooldown: 3,
        };
        for left in (0..3).rev() {
            assert!(camera.read_frame().is_none());
            assert_eq!(camera.cooldown, left);
            assert_eq!(camera.failed_reopens, 3);
        }
    }
}
