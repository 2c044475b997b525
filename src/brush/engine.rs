//! Brush core - drives one stroke from input samples to composited dabs

use std::sync::Arc;
use std::time::Instant;

use super::cache::{CacheStats, MaskCache};
use super::dynamics::{DynamicsContext, DynamicsOutput, DynamicsProvider};
use super::interpolation::{InterpolationParams, StrokeInterpolator};
use super::options::{PaintOptions, MAX_BRUSH_SIZE};
use super::transform::{TransformParams, ASPECT_RATIO_LIMIT};
use super::{Brush, SharedBrush};
use crate::core::{PaintError, Rect};
use crate::input::{Coords, StrokeSmoother};
use crate::paint::airbrush::RepeatTimer;
use crate::paint::compositor::{Compositor, PlacedMask};
use crate::paint::loops::PixelLoops;
use crate::paint::modes::{Compositing, FillContext, PaintMode};
use crate::paint::undo::UndoLog;
use crate::surface::Surface;

/// Scales below this paint nothing
const MIN_SCALE: f64 = 1e-7;

/// Result of a finished stroke
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeSummary {
    /// Dabs that reached the surface
    pub dabs: usize,
    /// Accumulated dirty region
    pub region: Option<Rect>,
    /// Brush-space distance travelled
    pub distance: f64,
    /// Pixel distance travelled
    pub pixel_dist: f64,
    /// Whether an undo entry was pushed
    pub committed: bool,
}

/// Paint core: owns the mask cache, the compositor and the stroke state of
/// one tool. The surface is written only through its compositor.
pub struct BrushCore {
    brush: Option<SharedBrush>,
    dynamics: Option<Arc<dyn DynamicsProvider>>,
    options: PaintOptions,
    mode: PaintMode,
    loops: PixelLoops,
    cache: MaskCache,
    compositor: Compositor,
    interpolator: StrokeInterpolator,
    smoother: StrokeSmoother,
    timer: RepeatTimer,
    active: bool,
    dabs: usize,
}

impl BrushCore {
    pub fn new(options: PaintOptions, mode: PaintMode) -> Result<Self, PaintError> {
        options.validate()?;
        Ok(Self {
            brush: None,
            dynamics: None,
            loops: PixelLoops::new(options.pixel_loops)?,
            cache: MaskCache::new(options.pressure_profile),
            compositor: Compositor::new(),
            interpolator: StrokeInterpolator::new(options.random_seed),
            smoother: StrokeSmoother::new(options.smoothing),
            timer: RepeatTimer::new(),
            active: false,
            dabs: 0,
            options,
            mode,
        })
    }

    pub fn set_brush(&mut self, brush: Option<SharedBrush>) {
        self.brush = brush;
    }

    pub fn set_dynamics(&mut self, dynamics: Option<Arc<dyn DynamicsProvider>>) {
        self.dynamics = dynamics;
    }

    pub fn options(&self) -> &PaintOptions {
        &self.options
    }

    /// Replace the options between strokes
    pub fn set_options(&mut self, options: PaintOptions) -> Result<(), PaintError> {
        if self.active {
            return Err(PaintError::StrokeAlreadyActive);
        }
        options.validate()?;
        if options.pixel_loops != self.options.pixel_loops {
            self.loops = PixelLoops::new(options.pixel_loops)?;
        }
        if options.pressure_profile != self.options.pressure_profile {
            self.cache = MaskCache::new(options.pressure_profile);
        }
        self.options = options;
        Ok(())
    }

    pub fn mode(&self) -> &PaintMode {
        &self.mode
    }

    pub fn set_mode(&mut self, mode: PaintMode) -> Result<(), PaintError> {
        if self.active {
            return Err(PaintError::StrokeAlreadyActive);
        }
        self.mode = mode;
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Pixels written since the stroke started
    pub fn dirty_region(&self) -> Option<Rect> {
        self.compositor.dirty_region()
    }

    pub fn timer(&self) -> &RepeatTimer {
        &self.timer
    }

    pub fn interpolator(&self) -> &StrokeInterpolator {
        &self.interpolator
    }

    fn resources(&self) -> Result<(SharedBrush, Arc<dyn DynamicsProvider>), PaintError> {
        let brush = self.brush.clone().ok_or(PaintError::NoBrush)?;
        let dynamics = self.dynamics.clone().ok_or(PaintError::NoDynamics)?;
        Ok((brush, dynamics))
    }

    /// Begin a stroke at `coords` and paint its first dab
    pub fn start(&mut self, surface: &mut Surface, coords: &Coords) -> Result<(), PaintError> {
        if self.active {
            return Err(PaintError::StrokeAlreadyActive);
        }
        self.resources()?;
        surface.format().ensure_paintable()?;

        self.mode.start(surface, &self.options)?;
        self.compositor.begin_stroke();
        self.smoother = StrokeSmoother::new(self.options.smoothing);
        let coords = &self.smoother.smooth(coords);
        self.interpolator = StrokeInterpolator::new(self.options.random_seed);
        self.interpolator.start(coords);
        self.timer.cancel();
        self.dabs = 0;
        self.active = true;

        tracing::debug!(
            "{} stroke started at ({:.1}, {:.1})",
            self.mode.name(),
            coords.x,
            coords.y
        );

        if let Err(e) = self.paint_dab(surface, coords, 0.0) {
            self.abort(surface);
            return Err(e);
        }
        self.schedule_airbrush(coords);
        Ok(())
    }

    /// Continue the stroke to `coords`; returns the number of dabs painted
    pub fn motion(&mut self, surface: &mut Surface, coords: &Coords) -> Result<usize, PaintError> {
        if !self.active {
            return Err(PaintError::StrokeNotActive);
        }
        let coords = self.smoother.smooth(coords);
        self.continue_to(surface, &coords, false)
    }

    /// Straight line from the last sample to `coords`, optionally snapped to
    /// 15 degree steps
    pub fn line_to(
        &mut self,
        surface: &mut Surface,
        coords: &Coords,
        constrain: bool,
    ) -> Result<usize, PaintError> {
        self.continue_to(surface, coords, constrain)
    }

    fn continue_to(
        &mut self,
        surface: &mut Surface,
        coords: &Coords,
        constrain: bool,
    ) -> Result<usize, PaintError> {
        if !self.active {
            return Err(PaintError::StrokeNotActive);
        }
        self.timer.cancel();

        self.interpolator.set_current(coords);
        if constrain {
            self.interpolator.constrain_15_degrees();
        }
        if self.mode.rounds_lines(&self.options) {
            self.interpolator.round_line();
        }

        let painted = self.paint_segment(surface)?;
        let current = *self.interpolator.current();
        self.schedule_airbrush(&current);
        Ok(painted)
    }

    fn paint_segment(&mut self, surface: &mut Surface) -> Result<usize, PaintError> {
        let (brush, dynamics) = self.resources()?;
        let last = *self.interpolator.last();
        let current = *self.interpolator.current();

        let ctx = DynamicsContext {
            fade_point: self.options.fade.fade_point(self.interpolator.pixel_dist()),
            random: self.interpolator.random(),
        };
        let (params, want_null_motion) = {
            let brush = brush.read();
            let transform =
                eval_transform_dynamics(&brush, &self.options, dynamics.as_ref(), &current, &ctx);
            let jitter = if dynamics.is_enabled(DynamicsOutput::Jitter) {
                self.options.jitter * dynamics.evaluate(DynamicsOutput::Jitter, &current, &ctx)
            } else {
                self.options.jitter
            };
            let params = InterpolationParams {
                x_axis: brush.x_axis(),
                y_axis: brush.y_axis(),
                scale: transform.scale,
                angle: transform.angle,
                spacing: self.options.spacing_for(brush.spacing()),
                jitter,
            };
            (params, brush.want_null_motion())
        };

        if last == current {
            if !want_null_motion {
                return Ok(0);
            }
            let pixel_dist = self.interpolator.pixel_dist();
            return Ok(self.paint_dab(surface, &current, pixel_dist)? as usize);
        }

        let stamps =
            self.interpolator
                .interpolate_current(&params, dynamics.as_ref(), &self.options.fade);
        let mut painted = 0;
        for stamp in &stamps {
            if self.paint_dab(surface, &stamp.coords, stamp.pixel_dist)? {
                painted += 1;
            }
        }
        Ok(painted)
    }

    /// Repeat the last dab; used by the airbrush while the pointer rests
    pub fn tick(&mut self, surface: &mut Surface) -> Result<bool, PaintError> {
        if !self.active {
            return Err(PaintError::StrokeNotActive);
        }
        let current = *self.interpolator.current();
        let pixel_dist = self.interpolator.pixel_dist();
        self.paint_dab(surface, &current, pixel_dist)
    }

    /// Fire the airbrush timer if it is due at `now`
    pub fn poll(&mut self, surface: &mut Surface, now: Instant) -> Result<bool, PaintError> {
        if !self.active || !self.timer.poll(now) {
            return Ok(false);
        }
        self.tick(surface)
    }

    /// End the stroke and push its undo entry to `log`
    pub fn finish(
        &mut self,
        surface: &mut Surface,
        log: &mut dyn UndoLog,
    ) -> Result<StrokeSummary, PaintError> {
        if !self.active {
            return Err(PaintError::StrokeNotActive);
        }
        self.timer.cancel();
        self.mode.finish();
        self.active = false;

        let region = self.compositor.dirty_region();
        let entry = self.compositor.commit(surface, self.mode.name());
        let committed = entry.is_some();
        if let Some(entry) = entry {
            log.push(entry);
        }

        let summary = StrokeSummary {
            dabs: self.dabs,
            region,
            distance: self.interpolator.distance(),
            pixel_dist: self.interpolator.pixel_dist(),
            committed,
        };
        tracing::debug!(
            "{} stroke finished: {} dabs, region {:?}",
            self.mode.name(),
            summary.dabs,
            summary.region
        );
        Ok(summary)
    }

    /// Abort the stroke and put the pre-stroke pixels back
    pub fn cancel(&mut self, surface: &mut Surface) -> Result<(), PaintError> {
        if !self.active {
            return Err(PaintError::StrokeNotActive);
        }
        tracing::debug!(
            "{} stroke cancelled, restoring {:?}",
            self.mode.name(),
            self.compositor.dirty_region()
        );
        self.abort(surface);
        Ok(())
    }

    fn abort(&mut self, surface: &mut Surface) {
        self.timer.cancel();
        self.mode.finish();
        self.compositor.cancel(surface);
        self.active = false;
    }

    fn schedule_airbrush(&mut self, coords: &Coords) {
        if !self.mode.is_airbrush() || self.options.airbrush.motion_only {
            return;
        }
        let Some(dynamics) = self.dynamics.clone() else {
            return;
        };
        let ctx = DynamicsContext {
            fade_point: self.options.fade.fade_point(self.interpolator.pixel_dist()),
            random: self.interpolator.random(),
        };
        let rate = self.options.airbrush.rate * dynamics.evaluate(DynamicsOutput::Rate, coords, &ctx);
        self.timer.schedule(Instant::now(), rate);
    }

    /// Paint one dab at `coords`; `Ok(false)` when nothing reached the surface
    fn paint_dab(
        &mut self,
        surface: &mut Surface,
        coords: &Coords,
        pixel_dist: f64,
    ) -> Result<bool, PaintError> {
        let (brush, dynamics) = self.resources()?;
        let brush = brush.read();
        let dynamics = dynamics.as_ref();

        let ctx = DynamicsContext {
            fade_point: self.options.fade.fade_point(pixel_dist),
            random: self.interpolator.random(),
        };
        let params = eval_transform_dynamics(&brush, &self.options, dynamics, coords, &ctx);
        if params.scale < MIN_SCALE {
            return Ok(false);
        }

        let Some((width, height)) = self
            .cache
            .transform_mask(&brush, &params, &self.loops)?
            .map(|m| (m.width(), m.height()))
        else {
            return Ok(false);
        };
        self.cache.transform_pixmap(&brush, &params, &self.loops)?;

        let Some(region) = self
            .compositor
            .get_paint_buffer(surface, coords.x, coords.y, width, height)?
            .map(|b| b.rect())
        else {
            return Ok(false);
        };
        if !self.mode.pre_paint(surface, region, &self.options) {
            return Ok(false);
        }

        let mut paint_opacity = dynamics.evaluate(DynamicsOutput::Opacity, coords, &ctx);
        if self.mode.is_airbrush() {
            paint_opacity *=
                self.options.airbrush.flow / 100.0 * dynamics.evaluate(DynamicsOutput::Flow, coords, &ctx);
        }
        let paint_opacity = paint_opacity.clamp(0.0, 1.0) as f32;
        let image_opacity = self.options.opacity as f32;

        let compositing = {
            let Some((buffer, undo)) = self.compositor.fill_target() else {
                return Ok(false);
            };
            let fill = FillContext {
                surface,
                undo,
                coords,
                options: &self.options,
                pixmap: self.cache.pixmap(),
                rate: dynamics.evaluate(DynamicsOutput::Rate, coords, &ctx),
                force: self.options.brush_force * dynamics.evaluate(DynamicsOutput::Force, coords, &ctx),
            };
            self.mode.paint(buffer, &fill)?
        };

        let application = self.mode.brush_application(&self.options);
        let mode = self.mode.application_mode(&self.options);
        let Some(mask) =
            self.cache
                .dab_mask(application, coords.x, coords.y, coords.pressure, &self.loops)?
        else {
            return Ok(false);
        };
        let placed = PlacedMask::centered(mask, coords.x, coords.y);

        match compositing {
            Compositing::Paste(blend_mode) => self.compositor.paste(
                surface,
                &placed,
                paint_opacity,
                image_opacity,
                blend_mode,
                mode,
                &self.loops,
            )?,
            Compositing::Replace => self.compositor.replace(
                surface,
                &placed,
                paint_opacity,
                image_opacity,
                mode,
                &self.loops,
            )?,
        }

        self.mode.post_paint(region);
        self.interpolator.mark_painted(coords);
        self.dabs += 1;
        Ok(true)
    }
}

/// Brush transform of one dab after dynamics
pub fn eval_transform_dynamics(
    brush: &Brush,
    options: &PaintOptions,
    dynamics: &dyn DynamicsProvider,
    coords: &Coords,
    ctx: &DynamicsContext,
) -> TransformParams {
    let native = brush.width().max(brush.height()).max(1) as f64;
    let size = options.brush_size.unwrap_or(native);

    let mut scale = size / native;
    if options.brush_zoom {
        let zoom = coords.xscale.max(coords.yscale);
        if zoom > 0.0 {
            scale /= zoom;
        }
    }
    if dynamics.is_enabled(DynamicsOutput::Size) {
        scale *= dynamics.evaluate(DynamicsOutput::Size, coords, ctx);
    }
    scale = scale.min(MAX_BRUSH_SIZE / native);

    let mut angle = options.brush_angle;
    if dynamics.is_enabled(DynamicsOutput::Angle) {
        angle += dynamics.evaluate(DynamicsOutput::Angle, coords, ctx);
    }

    let mut hardness = options.brush_hardness;
    if dynamics.is_enabled(DynamicsOutput::Hardness) {
        hardness *= dynamics.evaluate(DynamicsOutput::Hardness, coords, ctx);
    }

    let mut aspect_ratio = options.brush_aspect_ratio;
    if dynamics.is_enabled(DynamicsOutput::AspectRatio) {
        let value = dynamics.evaluate(DynamicsOutput::AspectRatio, coords, ctx);
        aspect_ratio = if aspect_ratio == 0.0 {
            10.0 * value
        } else {
            aspect_ratio * value
        };
    }

    TransformParams {
        scale: scale.max(0.0),
        aspect_ratio: aspect_ratio.clamp(-ASPECT_RATIO_LIMIT, ASPECT_RATIO_LIMIT),
        angle,
        reflect: coords.reflect,
        hardness: hardness.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::brush::dynamics::{Dynamics, DynamicsInput, FadeOptions, InputMapping, PressureCurve};
    use crate::brush::generated::GeneratedShape;
    use crate::brush::mask::TempBuf;
    use crate::paint::undo::MemoryUndoLog;
    use crate::surface::PixelFormat;

    fn round_brush(radius: f32) -> Brush {
        Brush::generated(
            "round",
            &GeneratedShape {
                radius,
                hardness: 1.0,
                roundness: 1.0,
            },
        )
        .unwrap()
    }

    fn core_with(mode: PaintMode, options: PaintOptions) -> BrushCore {
        let mut core = BrushCore::new(options, mode).unwrap();
        core.set_brush(Some(round_brush(4.0).into_shared()));
        core.set_dynamics(Some(Arc::new(Dynamics::off())));
        core
    }

    fn white(width: i32, height: i32) -> Surface {
        let mut surface = Surface::new(width, height, PixelFormat::Rgba8).unwrap();
        surface.fill([1.0, 1.0, 1.0, 1.0]).unwrap();
        surface
    }

    #[test]
    fn test_start_requires_brush_and_dynamics() {
        let mut surface = white(32, 32);
        let mut core = BrushCore::new(PaintOptions::default(), PaintMode::Paintbrush).unwrap();
        let at = Coords::new(8.0, 8.0, 1.0);

        assert!(matches!(core.start(&mut surface, &at), Err(PaintError::NoBrush)));
        core.set_brush(Some(round_brush(3.0).into_shared()));
        assert!(matches!(core.start(&mut surface, &at), Err(PaintError::NoDynamics)));
        assert!(!core.is_active());
        assert!(matches!(
            core.motion(&mut surface, &at),
            Err(PaintError::StrokeNotActive)
        ));
    }

    #[test]
    fn test_start_paints_first_dab() {
        let mut surface = white(32, 32);
        let mut core = core_with(PaintMode::Paintbrush, PaintOptions::default());
        core.start(&mut surface, &Coords::new(10.5, 10.5, 1.0)).unwrap();

        assert!(core.is_active());
        assert!(surface.pixel(10, 10)[0] < 0.1);
        assert_eq!(surface.pixel(25, 25), [1.0, 1.0, 1.0, 1.0]);
        assert!(core.dirty_region().unwrap().contains(10, 10));
        assert!(matches!(
            core.start(&mut surface, &Coords::new(1.0, 1.0, 1.0)),
            Err(PaintError::StrokeAlreadyActive)
        ));
    }

    #[test]
    fn test_stroke_paints_line_and_commits() {
        let mut surface = white(64, 64);
        let before = surface.read_raw(surface.bounds()).unwrap();
        let mut core = core_with(PaintMode::Paintbrush, PaintOptions::default());
        let mut log = MemoryUndoLog::new();

        core.start(&mut surface, &Coords::new(10.5, 20.5, 1.0)).unwrap();
        let painted = core.motion(&mut surface, &Coords::new(50.5, 20.5, 1.0)).unwrap();
        assert!(painted > 5);
        for x in (10..=50).step_by(5) {
            assert!(surface.pixel(x, 20)[0] < 0.1, "gap at x = {}", x);
        }
        assert_eq!(surface.pixel(30, 40), [1.0, 1.0, 1.0, 1.0]);

        let summary = core.finish(&mut surface, &mut log).unwrap();
        assert!(summary.committed);
        assert_eq!(summary.dabs, painted + 1);
        assert!(summary.pixel_dist > 39.0);
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().name(), "Paintbrush");
        assert!(!core.is_active());

        log.undo(&mut surface).unwrap();
        assert_eq!(surface.read_raw(surface.bounds()).unwrap(), before);
    }

    #[test]
    fn test_cancel_restores_surface() {
        let mut surface = white(64, 64);
        let before = surface.read_raw(surface.bounds()).unwrap();
        let mut core = core_with(PaintMode::Paintbrush, PaintOptions::default());

        core.start(&mut surface, &Coords::new(5.0, 5.0, 1.0)).unwrap();
        core.motion(&mut surface, &Coords::new(60.0, 40.0, 1.0)).unwrap();
        assert_ne!(surface.read_raw(surface.bounds()).unwrap(), before);

        core.cancel(&mut surface).unwrap();
        assert_eq!(surface.read_raw(surface.bounds()).unwrap(), before);
        assert!(core.dirty_region().is_none());
        assert!(!core.is_active());
    }

    #[test]
    fn test_unsupported_format_aborts_without_writes() {
        let mut surface = Surface::new(16, 16, PixelFormat::Indexed8).unwrap();
        let before = surface.read_raw(surface.bounds()).unwrap();
        let mut core = core_with(PaintMode::Paintbrush, PaintOptions::default());
        assert!(matches!(
            core.start(&mut surface, &Coords::new(8.0, 8.0, 1.0)),
            Err(PaintError::UnsupportedFormat(PixelFormat::Indexed8))
        ));
        assert!(!core.is_active());
        assert_eq!(surface.read_raw(surface.bounds()).unwrap(), before);
    }

    #[test]
    fn test_zero_size_paints_nothing() {
        let mut surface = white(32, 32);
        let options = PaintOptions {
            brush_size: Some(0.0),
            ..PaintOptions::default()
        };
        let mut core = core_with(PaintMode::Paintbrush, options);
        let mut log = MemoryUndoLog::new();
        core.start(&mut surface, &Coords::new(8.0, 8.0, 1.0)).unwrap();
        assert_eq!(core.motion(&mut surface, &Coords::new(20.0, 8.0, 1.0)).unwrap(), 0);
        assert!(core.interpolator().pixel_dist() > 11.0);

        let summary = core.finish(&mut surface, &mut log).unwrap();
        assert_eq!(summary.dabs, 0);
        assert!(!summary.committed);
        assert!(log.is_empty());
    }

    #[test]
    fn test_null_motion_needs_opt_in() {
        let mut surface = white(32, 32);
        let at = Coords::new(16.0, 16.0, 1.0);

        let mut core = core_with(PaintMode::Paintbrush, PaintOptions::default());
        core.start(&mut surface, &at).unwrap();
        assert_eq!(core.motion(&mut surface, &at).unwrap(), 0);

        let mut core = core_with(PaintMode::Paintbrush, PaintOptions::default());
        core.set_brush(Some(round_brush(4.0).with_null_motion(true).into_shared()));
        core.start(&mut surface, &at).unwrap();
        assert_eq!(core.motion(&mut surface, &at).unwrap(), 1);
    }

    #[test]
    fn test_airbrush_accumulates_while_resting() {
        let mut surface = Surface::new(64, 64, PixelFormat::Rgba8).unwrap();
        let mut core = core_with(PaintMode::Airbrush, PaintOptions::default());
        let at = Coords::new(32.0, 32.0, 1.0);

        core.start(&mut surface, &at).unwrap();
        assert!(core.timer().is_armed());
        let first = surface.pixel(32, 32)[3];
        assert!(first > 0.0);

        let later = Instant::now() + Duration::from_secs(1);
        assert!(core.poll(&mut surface, later).unwrap());
        assert!(surface.pixel(32, 32)[3] > first);

        let mut log = MemoryUndoLog::new();
        core.finish(&mut surface, &mut log).unwrap();
        assert!(!core.timer().is_armed());
        assert!(!core.poll(&mut surface, later + Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn test_plain_brush_after_color_brush_uses_color() {
        let mut surface = Surface::new(64, 64, PixelFormat::Rgba8).unwrap();
        let options = PaintOptions {
            color: [1.0, 0.0, 0.0, 1.0],
            ..PaintOptions::default()
        };
        let mut core = core_with(PaintMode::Paintbrush, options);
        let mut log = MemoryUndoLog::new();

        let plain = round_brush(4.0);
        let (w, h) = (plain.width(), plain.height());
        let green = TempBuf::from_vec_channels(w, h, 3, [0u8, 255, 0].repeat(w * h)).unwrap();
        core.set_brush(Some(round_brush(4.0).with_pixmap(green).unwrap().into_shared()));
        core.start(&mut surface, &Coords::new(16.5, 16.5, 1.0)).unwrap();
        core.finish(&mut surface, &mut log).unwrap();
        let px = surface.pixel(16, 16);
        assert!(px[1] > 0.9 && px[0] < 0.1);

        core.set_brush(Some(plain.into_shared()));
        core.start(&mut surface, &Coords::new(40.5, 40.5, 1.0)).unwrap();
        core.finish(&mut surface, &mut log).unwrap();
        let px = surface.pixel(40, 40);
        assert!(px[0] > 0.9 && px[1] < 0.1 && px[3] > 0.9, "{:?}", px);
    }

    #[test]
    fn test_fade_without_fade_mapping_keeps_opacity() {
        let mut surface = Surface::new(32, 32, PixelFormat::Rgba8).unwrap();
        let options = PaintOptions {
            color: [1.0, 0.0, 0.0, 1.0],
            fade: FadeOptions {
                length: 100.0,
                ..FadeOptions::default()
            },
            ..PaintOptions::default()
        };
        let mut core = core_with(PaintMode::Paintbrush, options);
        core.start(&mut surface, &Coords::new(16.5, 16.5, 1.0)).unwrap();
        let px = surface.pixel(16, 16);
        assert!(px[0] > 0.9 && px[3] > 0.9, "{:?}", px);
    }

    #[test]
    fn test_pencil_rounds_line_endpoints() {
        let mut surface = white(32, 32);
        let mut core = core_with(PaintMode::Pencil, PaintOptions::default());
        core.start(&mut surface, &Coords::new(4.2, 4.7, 1.0)).unwrap();
        core.motion(&mut surface, &Coords::new(20.9, 4.1, 1.0)).unwrap();
        let current = core.interpolator().current();
        assert_eq!((current.x, current.y), (20.5, 4.5));
    }

    #[test]
    fn test_options_locked_during_stroke() {
        let mut surface = white(32, 32);
        let mut core = core_with(PaintMode::Paintbrush, PaintOptions::default());
        core.start(&mut surface, &Coords::new(8.0, 8.0, 1.0)).unwrap();
        assert!(matches!(
            core.set_options(PaintOptions::default()),
            Err(PaintError::StrokeAlreadyActive)
        ));
        core.cancel(&mut surface).unwrap();
        assert!(core.set_options(PaintOptions::default()).is_ok());
    }

    #[test]
    fn test_transform_dynamics() {
        let brush = round_brush(5.0);
        let native = brush.width() as f64;
        let mut dynamics = Dynamics::off();
        dynamics.mappings_mut(DynamicsOutput::Size).push(InputMapping {
            input: DynamicsInput::Pressure,
            curve: PressureCurve::Linear,
        });
        let options = PaintOptions {
            brush_size: Some(40.0),
            ..PaintOptions::default()
        };
        let ctx = DynamicsContext::default();

        let params =
            eval_transform_dynamics(&brush, &options, &dynamics, &Coords::new(0.0, 0.0, 0.5), &ctx);
        assert!((params.scale - 20.0 / native).abs() < 1e-9);

        let zoomed = Coords {
            xscale: 2.0,
            yscale: 2.0,
            ..Coords::new(0.0, 0.0, 1.0)
        };
        let options = PaintOptions {
            brush_zoom: true,
            ..options
        };
        let params = eval_transform_dynamics(&brush, &options, &dynamics, &zoomed, &ctx);
        assert!((params.scale - 20.0 / native).abs() < 1e-9);

        let huge = PaintOptions {
            brush_size: Some(1e9),
            brush_zoom: false,
            ..options
        };
        let params =
            eval_transform_dynamics(&brush, &huge, &dynamics, &Coords::new(0.0, 0.0, 1.0), &ctx);
        assert!((params.scale * native - MAX_BRUSH_SIZE).abs() < 1e-6);
    }

    #[test]
    fn test_aspect_dynamics_from_zero() {
        let brush = round_brush(5.0);
        let mut dynamics = Dynamics::off();
        dynamics.mappings_mut(DynamicsOutput::AspectRatio).push(InputMapping {
            input: DynamicsInput::Pressure,
            curve: PressureCurve::Linear,
        });
        let ctx = DynamicsContext::default();
        let params = eval_transform_dynamics(
            &brush,
            &PaintOptions::default(),
            &dynamics,
            &Coords::new(0.0, 0.0, 1.0),
            &ctx,
        );
        assert!((params.aspect_ratio - 10.0).abs() < 1e-9);
    }
}
