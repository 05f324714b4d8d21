//! Progressive tile scheduling.
//!
//! Every tick renders one tile of the target image. Once all tiles of the grid
//! have been rendered, one sample pass is complete. Rendering starts at a
//! reduced resolution (the downsample level) that fits the whole viewport into
//! a single tile, and every completed pass at a reduced level steps up to the
//! next finer resolution. At level 0 passes keep accumulating samples.
//!
//! The scheduler is pure bookkeeping; [`crate::render::Renderer`] turns its
//! [`TileDispatch`]es into GPU work.

use crate::config::TracerConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    pub columns: u32,
    pub rows: u32,
}

impl TileGrid {
    pub fn tile_count(&self) -> u32 {
        self.columns * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.tile_count() == 0
    }
}

/// The work of one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileDispatch {
    pub tile: [u32; 2],
    /// Top-left pixel of the tile in target image coordinates.
    pub pixel_offset: [u32; 2],
    /// Size of the tile in pixels.
    pub extent: [u32; 2],
    pub target_size: [u32; 2],
    /// Workgroups to dispatch in x and y.
    pub workgroups: [u32; 2],
    /// Samples already accumulated before this one.
    pub sample: u32,
    pub level: u32,
}

impl TileDispatch {
    /// Running-average weight of this tile's result.
    pub fn blend_weight(&self) -> f32 {
        1.0 / (self.sample as f32 + 1.0)
    }

    /// Pixel offset handed to the kernel, with a sub-pixel jitter in `[0, 1)`.
    pub fn jittered_offset(&self, jitter: [f32; 2]) -> [f32; 2] {
        [
            self.pixel_offset[0] as f32 + jitter[0],
            self.pixel_offset[1] as f32 + jitter[1],
        ]
    }

    /// The tile rectangle in normalised target coordinates as
    /// `[x, y, width, height]`. May extend past 1.0 on the last row/column.
    pub fn mask(&self) -> [f32; 4] {
        let [w, h] = self.target_size.map(|v| v as f32);
        [
            self.pixel_offset[0] as f32 / w,
            self.pixel_offset[1] as f32 / h,
            self.extent[0] as f32 / w,
            self.extent[1] as f32 / h,
        ]
    }
}

/// What changed by advancing the tile cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Advance {
    pub sample_completed: bool,
    /// New target size if the downsample level dropped.
    pub target_resized: Option<[u32; 2]>,
}

#[derive(Clone, Debug)]
pub struct ProgressiveScheduler {
    tile_groups: [u32; 2],
    group_size: u32,
    viewport: [u32; 2],
    level: u32,
    tile: [u32; 2],
    sample: u32,
}

impl ProgressiveScheduler {
    pub fn new(config: &TracerConfig, viewport: [u32; 2]) -> Self {
        let mut scheduler = Self {
            tile_groups: config.tile_groups,
            group_size: config.group_size,
            viewport,
            level: 0,
            tile: [0, 0],
            sample: 0,
        };
        scheduler.level = scheduler.select_level();
        scheduler
    }

    pub fn tile_extent(&self) -> [u32; 2] {
        [
            self.tile_groups[0] * self.group_size,
            self.tile_groups[1] * self.group_size,
        ]
    }

    /// Smallest level at which a single tile, scaled up by the level, is
    /// larger than the viewport in both axes.
    pub fn select_level(&self) -> u32 {
        let [tw, th] = self.tile_extent().map(u64::from);
        let [vw, vh] = self.viewport.map(u64::from);
        if tw == 0 || th == 0 {
            return 0;
        }
        let mut level = 0;
        while (tw << level) <= vw || (th << level) <= vh {
            level += 1;
        }
        level
    }

    /// Adopt a new viewport size. Re-selects the downsample level and drops
    /// the progress of the old size.
    pub fn resize(&mut self, viewport: [u32; 2]) {
        self.viewport = viewport;
        self.level = self.select_level();
        self.invalidate();
        log::info!(
            "Viewport {}x{}, starting at downsample level {}",
            viewport[0],
            viewport[1],
            self.level
        );
    }

    /// Restart accumulation at the first tile. The downsample level is kept.
    pub fn invalidate(&mut self) {
        self.sample = 0;
        self.tile = [0, 0];
    }

    pub fn viewport(&self) -> [u32; 2] {
        self.viewport
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn tile(&self) -> [u32; 2] {
        self.tile
    }

    pub fn sample(&self) -> u32 {
        self.sample
    }

    pub fn is_degenerate(&self) -> bool {
        self.viewport[0] == 0 || self.viewport[1] == 0
    }

    /// Size of the image the kernel renders into at the current level.
    pub fn target_size(&self) -> [u32; 2] {
        if self.is_degenerate() {
            return [0, 0];
        }
        self.viewport.map(|v| (v >> self.level).max(1))
    }

    pub fn grid(&self) -> TileGrid {
        let [tw, th] = self.tile_extent();
        let [w, h] = self.target_size();
        if tw == 0 || th == 0 {
            return TileGrid {
                columns: 0,
                rows: 0,
            };
        }
        TileGrid {
            columns: w.div_ceil(tw),
            rows: h.div_ceil(th),
        }
    }

    /// The dispatch for the current cursor, `None` for a degenerate viewport.
    pub fn current(&self) -> Option<TileDispatch> {
        if self.grid().is_empty() {
            return None;
        }
        let extent = self.tile_extent();
        Some(TileDispatch {
            tile: self.tile,
            pixel_offset: [self.tile[0] * extent[0], self.tile[1] * extent[1]],
            extent,
            target_size: self.target_size(),
            workgroups: self.tile_groups,
            sample: self.sample,
            level: self.level,
        })
    }

    /// Move the cursor to the next tile, completing a sample pass after the
    /// last one.
    pub fn advance(&mut self) -> Advance {
        let grid = self.grid();
        if grid.is_empty() {
            return Advance::default();
        }

        self.tile[0] += 1;
        if self.tile[0] < grid.columns {
            return Advance::default();
        }
        self.tile[0] = 0;
        self.tile[1] += 1;
        if self.tile[1] < grid.rows {
            return Advance::default();
        }

        self.tile = [0, 0];
        self.sample += 1;
        let mut advance = Advance {
            sample_completed: true,
            target_resized: None,
        };
        if self.level > 0 {
            self.level -= 1;
            self.sample = 0;
            let size = self.target_size();
            log::info!(
                "Stepping up to downsample level {} ({}x{})",
                self.level,
                size[0],
                size[1]
            );
            advance.target_resized = Some(size);
        }
        advance
    }

    /// Take the current dispatch and advance past it. A degenerate viewport
    /// yields `None` and leaves all state untouched.
    pub fn tick(&mut self) -> Option<(TileDispatch, Advance)> {
        let dispatch = self.current()?;
        log::debug!(
            "Tile {:?} of {:?}, sample {}, level {}",
            dispatch.tile,
            self.grid(),
            dispatch.sample,
            dispatch.level
        );
        Some((dispatch, self.advance()))
    }
}
