//! Three-pass grid compositor.
//!
//! Pass order matters - each pass paints over the previous one:
//!
//! 1. **Base sampling**: every cell samples its tileset texture with
//!    floor-modulo wrapping; unresolvable cells fill neutral gray.
//! 2. **Cliff shading**: cells whose height differs from a cardinal
//!    neighbor by more than the break threshold darken a 3×3
//!    neighborhood, alpha untouched.
//! 3. **Priority borders**: cells bordering a higher-numbered tileset
//!    are overwritten opaque black.
//!
//! Missing textures never abort rasterization; they only degrade the
//! affected cells to gray.

use crate::hmap::{GRID_CELLS, GRID_SIDE};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::Arc;

/// Side length of a rendered tile in pixels - one pixel per grid cell.
pub const TILE_PIXELS: u32 = GRID_SIDE as u32;

/// Fill for cells whose tileset did not resolve.
const NEUTRAL_GRAY: Rgba<u8> = Rgba([128, 128, 128, 255]);

/// Height delta between cardinal neighbors that marks a cliff break.
const BREAK_THRESHOLD: f32 = 2.0;

/// Slack below the threshold so float noise does not flicker breaks
/// in and out between exports.
const BREAK_EPSILON: f32 = 1e-3;

/// Blend factor toward black for a break cell.
const BREAK_CENTER_SHADE: f32 = 1.0;

/// Blend factor toward black for the 8 cells around a break.
const BREAK_RING_SHADE: f32 = 0.1;

const CARDINALS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Renders one grid into a 100×100 image.
///
/// `tiles` holds one tileset index per cell, row-major; `heights` is the
/// optional per-cell heightmap; `textures` maps tileset indices to their
/// resolved images. Indices absent from `textures` render gray.
pub fn render_grid(
    tiles: &[u16],
    heights: Option<&[f32]>,
    textures: &HashMap<u16, Arc<RgbaImage>>,
) -> RgbaImage {
    debug_assert_eq!(tiles.len(), GRID_CELLS);

    let mut canvas = RgbaImage::new(TILE_PIXELS, TILE_PIXELS);

    sample_base(&mut canvas, tiles, textures);
    if let Some(heights) = heights {
        if heights.len() == GRID_CELLS {
            shade_cliffs(&mut canvas, heights);
        }
    }
    paint_priority_borders(&mut canvas, tiles);

    canvas
}

/// Pass 1: per-cell texture sampling with gray fallback.
fn sample_base(canvas: &mut RgbaImage, tiles: &[u16], textures: &HashMap<u16, Arc<RgbaImage>>) {
    for y in 0..GRID_SIDE {
        for x in 0..GRID_SIDE {
            let index = tiles[y * GRID_SIDE + x];
            let pixel = match textures.get(&index) {
                Some(texture) if texture.width() > 0 && texture.height() > 0 => {
                    let tx = floor_mod(x as i64, texture.width() as i64) as u32;
                    let ty = floor_mod(y as i64, texture.height() as i64) as u32;
                    *texture.get_pixel(tx, ty)
                }
                _ => NEUTRAL_GRAY,
            };
            canvas.put_pixel(x as u32, y as u32, pixel);
        }
    }
}

/// Pass 2: darken cliff breaks and their surroundings.
fn shade_cliffs(canvas: &mut RgbaImage, heights: &[f32]) {
    // Collect breaks first: shading must read pass-1 output, not its own.
    let mut breaks = Vec::new();
    for y in 1..GRID_SIDE - 1 {
        for x in 1..GRID_SIDE - 1 {
            let h = heights[y * GRID_SIDE + x];
            let is_break = CARDINALS.iter().any(|&(dx, dy)| {
                let nx = (x as i32 + dx) as usize;
                let ny = (y as i32 + dy) as usize;
                (h - heights[ny * GRID_SIDE + nx]).abs() > BREAK_THRESHOLD - BREAK_EPSILON
            });
            if is_break {
                breaks.push((x, y));
            }
        }
    }

    for (x, y) in breaks {
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let px = x as i32 + dx;
                let py = y as i32 + dy;
                if px < 0 || py < 0 || px >= GRID_SIDE as i32 || py >= GRID_SIDE as i32 {
                    continue;
                }
                let shade = if dx == 0 && dy == 0 {
                    BREAK_CENTER_SHADE
                } else {
                    BREAK_RING_SHADE
                };
                darken(canvas, px as u32, py as u32, shade);
            }
        }
    }
}

/// Pass 3: overwrite cells that border a higher-priority tileset.
fn paint_priority_borders(canvas: &mut RgbaImage, tiles: &[u16]) {
    const BORDER_BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    for y in 0..GRID_SIDE {
        for x in 0..GRID_SIDE {
            let own = tiles[y * GRID_SIDE + x];
            let outranked = CARDINALS.iter().any(|&(dx, dy)| {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= GRID_SIDE as i32 || ny >= GRID_SIDE as i32 {
                    return false;
                }
                tiles[ny as usize * GRID_SIDE + nx as usize] > own
            });
            if outranked {
                canvas.put_pixel(x as u32, y as u32, BORDER_BLACK);
            }
        }
    }
}

/// Blends a pixel's color channels toward black, preserving alpha.
#[inline]
fn darken(canvas: &mut RgbaImage, x: u32, y: u32, factor: f32) {
    let pixel = canvas.get_pixel_mut(x, y);
    for channel in 0..3 {
        pixel[channel] = (pixel[channel] as f32 * (1.0 - factor)).round() as u8;
    }
}

/// Modulo that is non-negative for any sign of `value`, so textures
/// smaller than a grid wrap seamlessly.
#[inline]
fn floor_mod(value: i64, modulus: i64) -> i64 {
    value.rem_euclid(modulus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_texture(w: u32, h: u32, rgba: [u8; 4]) -> Arc<RgbaImage> {
        Arc::new(RgbaImage::from_pixel(w, h, Rgba(rgba)))
    }

    fn flat_tiles(index: u16) -> Vec<u16> {
        vec![index; GRID_CELLS]
    }

    #[test]
    fn test_unresolved_tileset_fills_gray() {
        let canvas = render_grid(&flat_tiles(7), None, &HashMap::new());
        assert_eq!(*canvas.get_pixel(0, 0), NEUTRAL_GRAY);
        assert_eq!(*canvas.get_pixel(99, 99), NEUTRAL_GRAY);
        assert_eq!(*canvas.get_pixel(50, 23), NEUTRAL_GRAY);
    }

    #[test]
    fn test_all_unresolved_grid_is_uniform_gray() {
        let mut tiles = flat_tiles(0);
        tiles[500] = 3;
        tiles[501] = 9;
        let canvas = render_grid(&tiles, None, &HashMap::new());

        // No texture resolved anywhere: every pixel is gray except the
        // priority borders painted where indices differ.
        let gray_or_black = canvas
            .pixels()
            .all(|p| *p == NEUTRAL_GRAY || *p == Rgba([0, 0, 0, 255]));
        assert!(gray_or_black);
    }

    #[test]
    fn test_base_sampling_uses_texture_color() {
        let mut textures = HashMap::new();
        textures.insert(0u16, solid_texture(8, 8, [10, 200, 30, 255]));

        let canvas = render_grid(&flat_tiles(0), None, &textures);
        assert_eq!(*canvas.get_pixel(42, 17), Rgba([10, 200, 30, 255]));
    }

    #[test]
    fn test_small_texture_tiles_seamlessly() {
        // 3×3 texture with a unique corner pixel; the corner must repeat
        // every 3 cells in both axes.
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([50, 50, 50, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let mut textures = HashMap::new();
        textures.insert(0u16, Arc::new(img));

        let canvas = render_grid(&flat_tiles(0), None, &textures);
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(3, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(0, 6), Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.get_pixel(1, 0), Rgba([50, 50, 50, 255]));
    }

    #[test]
    fn test_cliff_break_darkens_center_to_black() {
        let mut textures = HashMap::new();
        textures.insert(0u16, solid_texture(4, 4, [200, 200, 200, 255]));

        // A height spike at (50, 50) well past the 2.0 threshold.
        let mut heights = vec![0.0f32; GRID_CELLS];
        heights[50 * GRID_SIDE + 50] = 10.0;

        let canvas = render_grid(&flat_tiles(0), Some(&heights), &textures);

        // The spike cell is a break: fully blended to black.
        assert_eq!(*canvas.get_pixel(50, 50), Rgba([0, 0, 0, 255]));
        // Far away cells keep the texture color.
        assert_eq!(*canvas.get_pixel(10, 10), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn test_cliff_ring_darkens_ten_percent() {
        let mut textures = HashMap::new();
        textures.insert(0u16, solid_texture(4, 4, [200, 200, 200, 100]));

        let mut heights = vec![0.0f32; GRID_CELLS];
        heights[50 * GRID_SIDE + 50] = 10.0;

        let canvas = render_grid(&flat_tiles(0), Some(&heights), &textures);

        // The spike's neighbors are breaks themselves (their delta to the
        // spike exceeds the threshold), so check a ring cell two steps
        // out: neighbor of a break, not a break itself.
        let pixel = canvas.get_pixel(48, 49);
        assert_eq!(pixel[0], 180, "10% blend toward black");
        assert_eq!(pixel[3], 100, "alpha must be preserved");
    }

    #[test]
    fn test_height_below_threshold_no_shading() {
        let mut textures = HashMap::new();
        textures.insert(0u16, solid_texture(4, 4, [200, 200, 200, 255]));

        let mut heights = vec![0.0f32; GRID_CELLS];
        heights[50 * GRID_SIDE + 50] = 1.9;

        let canvas = render_grid(&flat_tiles(0), Some(&heights), &textures);
        assert_eq!(*canvas.get_pixel(50, 50), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn test_outer_ring_never_breaks() {
        let mut textures = HashMap::new();
        textures.insert(0u16, solid_texture(4, 4, [200, 200, 200, 255]));

        // Spike on the corner: the outer ring is excluded from break
        // detection and no interior cell is its cardinal neighbor.
        let mut heights = vec![0.0f32; GRID_CELLS];
        heights[0] = 100.0;

        let canvas = render_grid(&flat_tiles(0), Some(&heights), &textures);
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([200, 200, 200, 255]));
        assert_eq!(*canvas.get_pixel(1, 1), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn test_priority_border_painted_black() {
        let mut textures = HashMap::new();
        textures.insert(0u16, solid_texture(4, 4, [10, 240, 10, 255]));
        textures.insert(5u16, solid_texture(4, 4, [10, 10, 240, 255]));

        // Left half tileset 0, right half tileset 5.
        let mut tiles = vec![0u16; GRID_CELLS];
        for y in 0..GRID_SIDE {
            for x in 50..GRID_SIDE {
                tiles[y * GRID_SIDE + x] = 5;
            }
        }

        let canvas = render_grid(&tiles, None, &textures);

        // Cells at x=49 border index 5 and are outranked.
        assert_eq!(*canvas.get_pixel(49, 10), Rgba([0, 0, 0, 255]));
        // Cells at x=50 have no greater neighbor.
        assert_eq!(*canvas.get_pixel(50, 10), Rgba([10, 10, 240, 255]));
        // Interior of the low-priority side untouched.
        assert_eq!(*canvas.get_pixel(10, 10), Rgba([10, 240, 10, 255]));
    }

    #[test]
    fn test_floor_mod_non_negative() {
        assert_eq!(floor_mod(-1, 8), 7);
        assert_eq!(floor_mod(-8, 8), 0);
        assert_eq!(floor_mod(5, 8), 5);
        assert_eq!(floor_mod(13, 8), 5);
    }
}
