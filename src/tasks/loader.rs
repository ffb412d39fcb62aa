use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use image::AnimationDecoder;
use image::codecs::gif::GifDecoder;
use tokio::time::sleep;
use tracing::debug;

use crate::display::{Frame, Surface};
use crate::error::DreamError;
use crate::events::MediaEntry;

/// GIF frame delays below this play at `ZERO_DELAY_SUBSTITUTE`, as in browsers.
const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);
const ZERO_DELAY_SUBSTITUTE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Full still image, EXIF orientation applied.
    Static,
    /// Only the first frame of an animation.
    FirstFrame,
    /// Every frame, for play-once animated playback.
    Animated,
}

#[derive(Debug, Clone)]
pub enum Drawable {
    Still(Frame),
    Animated(Animation),
}

impl Drawable {
    /// The frame to show before (or instead of) any animation.
    pub fn first_frame(&self) -> &Frame {
        match self {
            Self::Still(frame) => frame,
            Self::Animated(animation) => animation.first_frame(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Animation {
    frames: Vec<Frame>,
    repeat_count: u32,
}

impl Animation {
    /// Build an animation that plays once. Returns `None` without frames.
    pub fn new(frames: Vec<Frame>) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        Some(Self {
            frames,
            repeat_count: 0,
        })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn first_frame(&self) -> &Frame {
        &self.frames[0]
    }

    /// Extra loops after the first pass; 0 means play once.
    pub fn set_repeat_count(&mut self, repeat_count: u32) {
        self.repeat_count = repeat_count;
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn duration(&self) -> Duration {
        let pass: Duration = self.frames.iter().map(|f| f.delay).sum();
        pass * (self.repeat_count + 1)
    }

    /// Present every frame for its delay. Resolves once the last frame has
    /// dwelt, which is the animation's completion signal. Dropping the
    /// future stops playback.
    pub async fn play(&self, surface: &dyn Surface) -> Result<(), DreamError> {
        for pass in 0..=self.repeat_count {
            debug!(pass, frames = self.frames.len(), "animation pass");
            for frame in &self.frames {
                surface.present(frame)?;
                sleep(frame.delay).await;
            }
        }
        Ok(())
    }
}

/// Decodes an entry into something a [`Surface`] can show.
pub trait ImageLoader: Send + Sync {
    fn load(&self, entry: &MediaEntry, mode: LoadMode) -> BoxFuture<'static, Result<Drawable, DreamError>>;
}

/// Loader backed by the `image` crate, decoding on the blocking pool.
#[derive(Debug, Default, Clone)]
pub struct DecodingLoader;

impl ImageLoader for DecodingLoader {
    fn load(&self, entry: &MediaEntry, mode: LoadMode) -> BoxFuture<'static, Result<Drawable, DreamError>> {
        let path = entry.path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || decode(&path, mode))
                .await
                .map_err(|err| DreamError::Io(std::io::Error::other(err)))?
        })
    }
}

fn decode(path: &Path, mode: LoadMode) -> Result<Drawable, DreamError> {
    match mode {
        LoadMode::Static => decode_rgba8_apply_exif(path).map(|img| Drawable::Still(Frame::still(img))),
        LoadMode::FirstFrame => {
            let mut frames = decode_gif_frames(path, Some(1))?;
            let frame = frames.swap_remove(0);
            Ok(Drawable::Still(Frame::still(
                std::sync::Arc::unwrap_or_clone(frame.image),
            )))
        }
        LoadMode::Animated => {
            let frames = decode_gif_frames(path, None)?;
            // Nothing to animate; it dwells like a first-frame GIF.
            if frames.len() == 1 {
                debug!(path = %path.display(), "single-frame gif; treating as still");
                let frame = frames.into_iter().next().ok_or_else(|| no_frames(path))?;
                return Ok(Drawable::Still(frame));
            }
            Animation::new(frames)
                .map(Drawable::Animated)
                .ok_or_else(|| no_frames(path))
        }
    }
}

fn no_frames(path: &Path) -> DreamError {
    DreamError::NoFrames(path.to_path_buf())
}

fn decode_error(path: &Path, source: image::ImageError) -> DreamError {
    DreamError::Decode {
        path: path.to_path_buf(),
        source,
    }
}

// Decodes an image to RGBA8 and applies EXIF orientation if available.
fn decode_rgba8_apply_exif(path: &Path) -> Result<image::RgbaImage, DreamError> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|err| decode_error(path, err))?;
    let mut img = img.to_rgba8();

    let orientation: u16 = read_orientation(path).unwrap_or(1);
    match orientation {
        2 => img = image::imageops::flip_horizontal(&img),
        3 => img = image::imageops::rotate180(&img),
        4 => img = image::imageops::flip_vertical(&img),
        5 => {
            img = image::imageops::rotate90(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        6 => img = image::imageops::rotate90(&img),
        7 => {
            img = image::imageops::rotate270(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        8 => img = image::imageops::rotate270(&img),
        _ => {}
    }

    Ok(img)
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)? as u16;
    debug!("exif orientation {} for {}", o, path.display());
    Some(o)
}

fn decode_gif_frames(path: &Path, limit: Option<usize>) -> Result<Vec<Frame>, DreamError> {
    let reader = BufReader::new(File::open(path)?);
    let decoder = GifDecoder::new(reader).map_err(|err| decode_error(path, err))?;
    let limit = limit.unwrap_or(usize::MAX);

    let mut frames = Vec::new();
    for frame in decoder.into_frames().take(limit) {
        let frame = frame.map_err(|err| decode_error(path, err))?;
        let delay = frame_delay(frame.delay());
        frames.push(Frame {
            image: std::sync::Arc::new(frame.into_buffer()),
            delay,
        });
    }
    if frames.is_empty() {
        return Err(no_frames(path));
    }
    debug!(path = %path.display(), frames = frames.len(), "decoded gif");
    Ok(frames)
}

fn frame_delay(delay: image::Delay) -> Duration {
    let (numer, denom) = delay.numer_denom_ms();
    let nanos = if denom == 0 {
        0
    } else {
        u64::from(numer) * 1_000_000 / u64::from(denom)
    };
    let delay = Duration::from_nanos(nanos);
    if delay < MIN_FRAME_DELAY {
        ZERO_DELAY_SUBSTITUTE
    } else {
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Rgba, RgbaImage};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CountingSurface {
        presented: Mutex<Vec<(u32, u32)>>,
    }

    impl Surface for CountingSurface {
        fn present(&self, frame: &Frame) -> Result<(), DreamError> {
            self.presented
                .lock()
                .unwrap()
                .push(frame.image.dimensions());
            Ok(())
        }
    }

    fn write_gif(path: &Path, frames: usize, delay_ms: u32) {
        let file = File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames = (0..frames).map(|i| {
            let shade = (i * 40) as u8;
            image::Frame::from_parts(
                RgbaImage::from_pixel(4, 3, Rgba([shade, 0, 0, 255])),
                0,
                0,
                Delay::from_numer_denom_ms(delay_ms, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
    }

    fn entry(path: &Path) -> MediaEntry {
        MediaEntry::new(path, Some("image/gif"))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn animated_gif_decodes_all_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("anim.gif");
        write_gif(&path, 3, 40);

        let drawable = DecodingLoader
            .load(&entry(&path), LoadMode::Animated)
            .await
            .unwrap();
        match drawable {
            Drawable::Animated(animation) => {
                assert_eq!(animation.frames().len(), 3);
                assert_eq!(animation.repeat_count(), 0);
                assert_eq!(animation.duration(), Duration::from_millis(120));
                assert_eq!(animation.first_frame().image.dimensions(), (4, 3));
            }
            other => panic!("expected animation, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn first_frame_mode_yields_still() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("anim.gif");
        write_gif(&path, 3, 40);

        let drawable = DecodingLoader
            .load(&entry(&path), LoadMode::FirstFrame)
            .await
            .unwrap();
        assert!(matches!(drawable, Drawable::Still(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_frame_gif_is_still_even_when_animating() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("dot.gif");
        write_gif(&path, 1, 40);

        let drawable = DecodingLoader
            .load(&entry(&path), LoadMode::Animated)
            .await
            .unwrap();
        assert!(matches!(drawable, Drawable::Still(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn static_png_decodes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("still.png");
        RgbaImage::from_pixel(5, 2, Rgba([0, 255, 0, 255]))
            .save(&path)
            .unwrap();

        let drawable = DecodingLoader
            .load(&MediaEntry::new(&path, Some("image/png")), LoadMode::Static)
            .await
            .unwrap();
        assert_eq!(drawable.first_frame().image.dimensions(), (5, 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn garbage_fails_to_decode() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let result = DecodingLoader
            .load(&MediaEntry::new(&path, Some("image/png")), LoadMode::Static)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn play_presents_each_frame_once() {
        let frames = (0..3)
            .map(|_| Frame {
                image: Arc::new(RgbaImage::new(2, 2)),
                delay: Duration::from_millis(10),
            })
            .collect();
        let animation = Animation::new(frames).unwrap();
        let surface = CountingSurface::default();
        animation.play(&surface).await.unwrap();
        assert_eq!(surface.presented.lock().unwrap().len(), 3);
    }

    #[test]
    fn zero_delays_are_substituted() {
        assert_eq!(
            frame_delay(Delay::from_numer_denom_ms(0, 1)),
            ZERO_DELAY_SUBSTITUTE
        );
        assert_eq!(
            frame_delay(Delay::from_numer_denom_ms(70, 1)),
            Duration::from_millis(70)
        );
    }

    #[test]
    fn repeat_count_scales_duration() {
        let frames = vec![Frame {
            image: Arc::new(RgbaImage::new(1, 1)),
            delay: Duration::from_millis(50),
        }];
        let mut animation = Animation::new(frames).unwrap();
        assert_eq!(animation.duration(), Duration::from_millis(50));
        animation.set_repeat_count(2);
        assert_eq!(animation.duration(), Duration::from_millis(150));
    }

    #[test]
    fn empty_animation_is_rejected() {
        assert!(Animation::new(Vec::new()).is_none());
    }
}
