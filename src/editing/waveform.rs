/*!
 * Waveform rendering and the three click gestures on it.
 *
 * A plain click seeks and previews from the clicked time. With the start or end
 * modifier held, the clicked time becomes the sentence's new boundary. Boundary
 * edits are only possible on full-track waveforms of the highlighted sentence.
 */

use std::sync::Arc;

use log::{debug, info, warn};

use crate::api::ArticleApi;
use crate::app_config::WaveformConfig;
use crate::audio::playback::{PlaybackRequest, PlaybackScheduler, PlaybackStarted};
use crate::audio::{AudioSource, DecodedAudio};
use crate::editing::timestamps::{Boundary, commit_boundary};
use crate::errors::EngineError;
use crate::sentence_index::{Direction, Sentence, SentenceIndex, SentenceKey, TimeWindow};

/// A point on the render surface, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Drawing primitives the waveform needs
pub trait RenderSurface: Send + std::fmt::Debug {
    /// Resize and blank the surface
    fn clear(&mut self, width: u32, height: u32);
    fn fill_polygon(&mut self, points: &[Point]);
    /// Seek marker across the full height
    fn vertical_line(&mut self, x: f64);
    /// Take the waveform off screen
    fn remove(&mut self);
}

/// One call received by a [`RecordingSurface`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear { width: u32, height: u32 },
    Polygon(Vec<Point>),
    Marker(f64),
    Remove,
}

/// Headless surface that keeps every draw command
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Commands since the last clear, i.e. what is currently on screen
    pub fn visible(&self) -> &[DrawCommand] {
        let start = self
            .commands
            .iter()
            .rposition(|c| matches!(c, DrawCommand::Clear { .. } | DrawCommand::Remove))
            .unwrap_or(0);
        match self.commands.get(start) {
            Some(DrawCommand::Remove) => &[],
            _ => &self.commands[start..],
        }
    }
}

impl RenderSurface for RecordingSurface {
    fn clear(&mut self, width: u32, height: u32) {
        self.commands.push(DrawCommand::Clear { width, height });
    }

    fn fill_polygon(&mut self, points: &[Point]) {
        self.commands.push(DrawCommand::Polygon(points.to_vec()));
    }

    fn vertical_line(&mut self, x: f64) {
        self.commands.push(DrawCommand::Marker(x));
    }

    fn remove(&mut self) {
        self.commands.push(DrawCommand::Remove);
    }
}

/// Pixel geometry of a rendered window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformLayout {
    pub window: TimeWindow,
    pub width: u32,
    pub height: u32,
    pub ms_per_pixel: f64,
}

impl WaveformLayout {
    /// Width follows the configured resolution. When the width is clamped to the
    /// minimum or maximum raster width, the resolution is rescaled so the window
    /// spans exactly `width` pixels.
    pub fn compute(window: TimeWindow, settings: &WaveformConfig) -> Self {
        let duration = window.duration_ms() as f64;
        let natural = (duration / settings.ms_per_pixel).ceil() as u32;
        let width = natural.max(settings.min_width_px).min(settings.max_width_px);
        let ms_per_pixel = if width == natural {
            settings.ms_per_pixel
        } else {
            debug!(
                "Window of {}ms drawn {}px wide, using {:.2}ms/px",
                window.duration_ms(),
                width,
                duration / width as f64
            );
            duration / width as f64
        };
        Self {
            window,
            width,
            height: settings.height_px,
            ms_per_pixel,
        }
    }

    /// Absolute time under a horizontal pixel offset
    pub fn time_at(&self, x: f64) -> i64 {
        (self.window.start_ms as f64 + x * self.ms_per_pixel).round() as i64
    }

    /// Horizontal pixel offset of an absolute time
    pub fn x_of(&self, time_ms: i64) -> f64 {
        (time_ms - self.window.start_ms) as f64 / self.ms_per_pixel
    }
}

/// Peak magnitude per column over the window's samples.
///
/// Column `x` covers samples `[floor(x*spp), floor((x+1)*spp))` of the window;
/// a column narrower than one sample takes the sample it starts on.
pub fn compute_envelope(samples: &[f32], sample_rate: u32, layout: &WaveformLayout) -> Vec<f32> {
    let width = layout.width as usize;
    let to_sample = |ms: i64| ((ms.max(0) as f64 / 1000.0) * sample_rate as f64).floor() as usize;
    let start = to_sample(layout.window.start_ms).min(samples.len());
    let end = to_sample(layout.window.end_ms).min(samples.len());
    if end <= start || width == 0 {
        return vec![0.0; width];
    }

    let segment = &samples[start..end];
    let samples_per_column = segment.len() as f64 / width as f64;
    (0..width)
        .map(|x| {
            let from = (x as f64 * samples_per_column).floor() as usize;
            let to = (((x + 1) as f64 * samples_per_column).floor() as usize).min(segment.len());
            if to > from {
                segment[from..to].iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
            } else {
                segment.get(from).map(|s| s.abs()).unwrap_or(0.0)
            }
        })
        .collect()
}

/// Closed band around the vertical centre, top edge left to right then bottom edge back
pub fn envelope_polygon(envelope: &[f32], layout: &WaveformLayout) -> Vec<Point> {
    if envelope.is_empty() {
        return Vec::new();
    }
    let mid = layout.height as f64 / 2.0;
    let amplitude = |x: usize| envelope[x.min(envelope.len() - 1)].min(1.0) as f64;

    let mut points = Vec::with_capacity(2 * envelope.len() + 2);
    for x in 0..=envelope.len() {
        points.push(Point {
            x: x as f64,
            y: mid - amplitude(x) * mid,
        });
    }
    for x in (0..=envelope.len()).rev() {
        points.push(Point {
            x: x as f64,
            y: mid + amplitude(x) * mid,
        });
    }
    points
}

/// What is currently on the surface
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedWaveform {
    pub sentence: SentenceKey,
    pub source: AudioSource,
    pub layout: WaveformLayout,
    pub envelope: Vec<f32>,
    pub marker_x: Option<f64>,
}

/// Modifier held while clicking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickModifier {
    /// Seek and preview
    #[default]
    None,
    /// Make the clicked time the sentence start
    SetStart,
    /// Make the clicked time the sentence end
    SetEnd,
}

/// A click on the waveform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformClick {
    /// Horizontal offset in pixels from the left edge
    pub x: f64,
    pub modifier: ClickModifier,
}

/// Result of a click
#[derive(Debug)]
pub enum ClickOutcome {
    /// Preview started from the clicked time; `None` for an ignored seek
    Seek {
        time_ms: i64,
        playback: Option<PlaybackStarted>,
    },
    /// A boundary was committed
    Committed {
        key: SentenceKey,
        boundary: Boundary,
        window: TimeWindow,
    },
}

/// Everything a waveform operation may touch
pub struct EditContext<'a> {
    pub index: &'a mut SentenceIndex,
    pub playback: &'a mut PlaybackScheduler,
    /// Loaded buffer and the source it belongs to
    pub buffer: Option<(AudioSource, &'a Arc<DecodedAudio>)>,
    pub api: &'a dyn ArticleApi,
    pub surface: &'a mut dyn RenderSurface,
    /// Sentence carrying the active highlight
    pub highlighted: Option<SentenceKey>,
}

/// Renders one sentence's waveform and interprets clicks on it
#[derive(Debug, Clone)]
pub struct WaveformEditor {
    settings: WaveformConfig,
    displayed: Option<DisplayedWaveform>,
}

impl WaveformEditor {
    pub fn new(settings: WaveformConfig) -> Self {
        Self {
            settings,
            displayed: None,
        }
    }

    pub fn displayed(&self) -> Option<&DisplayedWaveform> {
        self.displayed.as_ref()
    }

    /// Render a sentence's window of the loaded source
    pub fn render(
        &mut self,
        sentence: &Sentence,
        source: AudioSource,
        buffer: &DecodedAudio,
        surface: &mut dyn RenderSurface,
    ) -> Result<&DisplayedWaveform, EngineError> {
        let window = sentence.window(matches!(source, AudioSource::Part(_)))?;
        self.render_window(sentence.key, window, source, buffer, surface)
    }

    /// Render an explicit window
    pub fn render_window(
        &mut self,
        key: SentenceKey,
        window: TimeWindow,
        source: AudioSource,
        buffer: &DecodedAudio,
        surface: &mut dyn RenderSurface,
    ) -> Result<&DisplayedWaveform, EngineError> {
        let layout = WaveformLayout::compute(window, &self.settings);
        let envelope = compute_envelope(buffer.primary_channel(), buffer.sample_rate(), &layout);

        surface.clear(layout.width, layout.height);
        surface.fill_polygon(&envelope_polygon(&envelope, &layout));
        debug!(
            "Rendered {} ({}..{}ms) at {}px, {:.2}ms/px",
            key, window.start_ms, window.end_ms, layout.width, layout.ms_per_pixel
        );

        Ok(self.displayed.insert(DisplayedWaveform {
            sentence: key,
            source,
            layout,
            envelope,
            marker_x: None,
        }))
    }

    /// Interpret a click on the displayed waveform
    pub async fn handle_click(
        &mut self,
        click: WaveformClick,
        ctx: EditContext<'_>,
    ) -> Result<ClickOutcome, EngineError> {
        let (key, source, layout) = match &self.displayed {
            Some(d) => (d.sentence, d.source, d.layout),
            None => return Err(EngineError::EditNotPermitted("no waveform is displayed".to_string())),
        };
        let time_ms = layout.time_at(click.x);

        let boundary = match click.modifier {
            ClickModifier::None => {
                ctx.surface.vertical_line(click.x);
                if let Some(displayed) = self.displayed.as_mut() {
                    displayed.marker_x = Some(click.x);
                }
                let sentence = ctx.index.require(key)?;
                let request = PlaybackRequest::seek(matches!(source, AudioSource::Part(_)), time_ms);
                let playback = ctx
                    .playback
                    .play(sentence, ctx.buffer.map(|(_, b)| b), request)?;
                return Ok(ClickOutcome::Seek { time_ms, playback });
            }
            ClickModifier::SetStart => Boundary::Start,
            ClickModifier::SetEnd => Boundary::End,
        };

        if source != AudioSource::Full {
            return Err(EngineError::EditNotPermitted(
                "timestamps can only be edited on the full-track waveform".to_string(),
            ));
        }
        if ctx.highlighted != Some(key) {
            warn!("Refusing edit of {}: it is not the highlighted sentence", key);
            return Err(EngineError::EditNotPermitted(format!(
                "select sentence {} before editing its waveform",
                key
            )));
        }

        let window = commit_boundary(ctx.index, key, boundary, time_ms, ctx.api).await?;
        self.refresh(key, ctx.index, ctx.buffer, ctx.surface)?;
        Ok(ClickOutcome::Committed {
            key,
            boundary,
            window,
        })
    }

    /// Move a sentence's start to the end of the previous sentence
    pub async fn align_start_to_previous(
        &mut self,
        key: SentenceKey,
        ctx: EditContext<'_>,
    ) -> Result<TimeWindow, EngineError> {
        self.align(key, Direction::Previous, ctx).await
    }

    /// Move a sentence's end to the start of the next sentence
    pub async fn align_end_to_next(
        &mut self,
        key: SentenceKey,
        ctx: EditContext<'_>,
    ) -> Result<TimeWindow, EngineError> {
        self.align(key, Direction::Next, ctx).await
    }

    async fn align(
        &mut self,
        key: SentenceKey,
        direction: Direction,
        ctx: EditContext<'_>,
    ) -> Result<TimeWindow, EngineError> {
        let (boundary, new_time_ms) = match (direction, ctx.index.adjacent(key, direction)) {
            (Direction::Previous, Some(previous)) => (Boundary::Start, previous.full_end_ms),
            (Direction::Next, Some(next)) => (Boundary::End, next.full_start_ms),
            (Direction::Previous, None) => {
                return Err(EngineError::EditNotPermitted(format!("{} has no previous sentence", key)))
            }
            (Direction::Next, None) => {
                return Err(EngineError::EditNotPermitted(format!("{} has no next sentence", key)))
            }
        };

        let window = commit_boundary(ctx.index, key, boundary, new_time_ms, ctx.api).await?;
        info!("Aligned {} of {} to {}ms", boundary, key, new_time_ms);
        self.refresh(key, ctx.index, ctx.buffer, ctx.surface)?;
        Ok(window)
    }

    /// Re-render after an edit when the edited sentence is on screen
    fn refresh(
        &mut self,
        key: SentenceKey,
        index: &SentenceIndex,
        buffer: Option<(AudioSource, &Arc<DecodedAudio>)>,
        surface: &mut dyn RenderSurface,
    ) -> Result<(), EngineError> {
        let source = match &self.displayed {
            Some(d) if d.sentence == key => d.source,
            _ => return Ok(()),
        };
        match buffer {
            Some((loaded, buffer)) if loaded == source => {
                let sentence = index.require(key)?;
                self.render(sentence, source, buffer, surface)?;
            }
            _ => debug!("Not re-rendering {}: its source is no longer loaded", key),
        }
        Ok(())
    }

    /// Take the waveform off screen; no data changes
    pub fn close(&mut self, surface: &mut dyn RenderSurface) {
        if self.displayed.take().is_some() {
            surface.remove();
        }
    }
}
