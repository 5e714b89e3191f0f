use std::sync::Arc;

use crate::error::RenderError;
use crate::hub::{BroadcastHub, BroadcastReport};
use crate::intervaltimer::IntervalTimer;
use crate::operation::Pipeline;
use crate::pixel::PixelBuffer;
use crate::shutdown::Shutdown;

/// The render loop. Owns the strip; nothing else writes to it.
pub struct Renderer {
    buffer: PixelBuffer,
    pipeline: Arc<Pipeline>,
    hub: Arc<BroadcastHub>,
    fps: u32,
}

impl Renderer {
    pub fn new(
        pixel_count: usize,
        pipeline: Arc<Pipeline>,
        hub: Arc<BroadcastHub>,
        fps: u32,
    ) -> Renderer {
        Renderer {
            buffer: PixelBuffer::new(pixel_count),
            pipeline,
            hub,
            fps,
        }
    }

    /// Renders, snapshots and broadcasts one frame. A failed render skips
    /// the broadcast; the strip keeps whatever was written so far.
    pub fn tick(&mut self) -> Result<BroadcastReport, RenderError> {
        self.pipeline.render(self.buffer.pixels_mut())?;
        let frame = self.buffer.snapshot();
        Ok(self.hub.broadcast(&frame))
    }

    /// Runs until `shutdown` is requested, always finishing the current tick.
    pub fn run(&mut self, shutdown: &Shutdown) {
        let mut timer = IntervalTimer::new(self.fps);
        log::info!(
            "Rendering {} pixels every {:?}",
            self.buffer.len(),
            timer.interval()
        );

        while !shutdown.is_requested() {
            timer.start_tick();
            match self.tick() {
                Ok(report) if report.failed > 0 => log::debug!(
                    "Frame reached {} viewer(s), {} failed",
                    report.delivered,
                    report.failed
                ),
                Ok(_) => {}
                Err(err) => log::error!("Skipping frame: {err}"),
            }
            timer.sleep_until_next_tick();
        }

        self.hub.close_all();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::hub::tests::Recording;
    use crate::operation::tests::Fill;
    use crate::operation::{Effect, Operation, Parameter};
    use crate::pixel::Pixel;

    fn renderer_with(operations: Vec<Operation>, pixel_count: usize) -> (Renderer, Arc<BroadcastHub>) {
        let pipeline = Arc::new(Pipeline::new(operations).unwrap());
        let hub = Arc::new(BroadcastHub::new());
        (Renderer::new(pixel_count, pipeline, Arc::clone(&hub), 60), hub)
    }

    #[test]
    fn tick_broadcasts_rendered_frame() {
        let (mut renderer, hub) = renderer_with(vec![Operation::new("fill", Fill::new([10, 20, 30]))], 3);
        let viewer = Arc::new(Recording::default());
        hub.add_viewer(viewer.clone());

        let report = renderer.tick().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(
            *viewer.frames.lock().unwrap(),
            vec![r#"{"values":[[10,20,30],[10,20,30],[10,20,30]]}"#.to_string()]
        );
    }

    /// Fails every other frame after painting the first pixel.
    struct Flaky {
        frame: u64,
    }

    impl Effect for Flaky {
        fn parameters(&mut self) -> Vec<Parameter<'_>> {
            vec![]
        }

        fn render(&mut self, pixels: &mut [Pixel]) -> Result<(), String> {
            self.frame += 1;
            pixels[0] = Pixel::new(self.frame as u8, 0, 0, 255);
            if self.frame % 2 == 0 {
                return Err(format!("frame {} is even", self.frame));
            }
            Ok(())
        }
    }

    #[test]
    fn failed_render_skips_broadcast_only() {
        let (mut renderer, hub) = renderer_with(vec![Operation::new("flaky", Flaky { frame: 0 })], 2);
        let viewer = Arc::new(Recording::default());
        hub.add_viewer(viewer.clone());

        assert!(renderer.tick().is_ok());
        assert!(renderer.tick().is_err());
        assert!(renderer.tick().is_ok());

        let frames = viewer.frames.lock().unwrap();
        assert_eq!(
            *frames,
            vec![
                r#"{"values":[[1,0,0],[0,0,0]]}"#.to_string(),
                r#"{"values":[[3,0,0],[0,0,0]]}"#.to_string(),
            ]
        );
    }

    #[test]
    fn run_stops_on_shutdown_and_drops_viewers() {
        let (mut renderer, hub) = renderer_with(vec![Operation::new("fill", Fill::new([1, 1, 1]))], 4);
        let viewer = Arc::new(Recording::default());
        hub.add_viewer(viewer.clone());
        let shutdown = Shutdown::new();

        let worker = {
            let shutdown = shutdown.clone();
            thread::spawn(move || renderer.run(&shutdown))
        };
        thread::sleep(Duration::from_millis(100));
        let requested = Instant::now();
        shutdown.request();
        worker.join().unwrap();

        assert!(requested.elapsed() < Duration::from_secs(1));
        assert!(!viewer.frames.lock().unwrap().is_empty());
        assert_eq!(hub.viewer_count(), 0);
    }

    #[test]
    fn run_holds_the_frame_rate() {
        let (mut renderer, hub) = renderer_with(vec![Operation::new("fill", Fill::new([1, 1, 1]))], 4);
        renderer.fps = 50;
        let viewer = Arc::new(Recording::default());
        hub.add_viewer(viewer.clone());
        let shutdown = Shutdown::new();

        let worker = {
            let shutdown = shutdown.clone();
            thread::spawn(move || renderer.run(&shutdown))
        };
        thread::sleep(Duration::from_millis(500));
        shutdown.request();
        worker.join().unwrap();

        // About 25 frames; leave room for a busy test machine.
        let frames = viewer.frames.lock().unwrap().len();
        assert!((10..=30).contains(&frames), "{frames} frames");
    }
}
