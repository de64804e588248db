use crate::enums::{Orientation, ResampleFilter};
use crate::error::{Error, Result};
use crate::frame::{FrameBuffer2D, Rgba8};
use crate::interpolator::Interpolator;

use log::debug;
use ndarray::ArrayView3;
use rayon::prelude::*;

/// A flat RGBA voxel buffer assembled from an ordered slice stack.
///
/// Voxel `(x, y, z)` lives at `z * (width * height) + y * width + x`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeStore {
    width: u32,
    height: u32,
    depth: u32,
    voxels: Vec<Rgba8>,
}

impl VolumeStore {
    /// Build a volume from slices in stack order.
    ///
    /// The first slice fixes `width` and `height`. Slices of that size are
    /// copied in as they are; others are resampled to it first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] when `slices` is empty.
    pub fn build(slices: &[FrameBuffer2D], filter: ResampleFilter) -> Result<Self> {
        let first = slices.first().ok_or(Error::EmptyInput)?;
        let (width, height) = first.dim();
        let depth = slices.len() as u32;

        let plane = width as usize * height as usize;
        let mut voxels = Vec::with_capacity(plane * depth as usize);
        for (z, slice) in slices.iter().enumerate() {
            if slice.dim() == (width, height) {
                voxels.extend_from_slice(slice.pixels());
                continue;
            }
            debug!(
                "Resampling slice {} from {:?} to {}x{}",
                z,
                slice.dim(),
                width,
                height
            );
            let fitted = Interpolator::fit(slice, width, height, filter)?;
            voxels.extend_from_slice(fitted.pixels());
        }

        debug!("Built volume {}x{}x{}", width, height, depth);
        Ok(Self {
            width,
            height,
            depth,
            voxels,
        })
    }

    /// Get the dimensions of the volume (width, height, depth)
    pub fn dim(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    pub fn voxels(&self) -> &[Rgba8] {
        &self.voxels
    }

    /// The voxel buffer as a (depth, height, width) array view
    pub fn view(&self) -> Result<ArrayView3<'_, Rgba8>> {
        let shape = (
            self.depth as usize,
            self.height as usize,
            self.width as usize,
        );
        Ok(ArrayView3::from_shape(shape, &self.voxels[..])?)
    }

    #[inline]
    pub fn flat_index(&self, x: u32, y: u32, z: u32) -> usize {
        z as usize * (self.width as usize * self.height as usize)
            + y as usize * self.width as usize
            + x as usize
    }

    pub fn voxel(&self, x: u32, y: u32, z: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height || z >= self.depth {
            return None;
        }
        Some(self.voxels[self.flat_index(x, y, z)])
    }

    /// Number of slices available along `orientation`
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        match orientation {
            Orientation::Axial => self.depth as usize,
            Orientation::Coronal => self.height as usize,
            Orientation::Sagittal => self.width as usize,
        }
    }

    /// Output frame size for `orientation` as (width, height)
    fn output_dimensions(&self, orientation: Orientation) -> (u32, u32) {
        match orientation {
            // Looking down z: x is width, y is height
            Orientation::Axial => (self.width, self.height),
            // Looking down y: x is width, z is height
            Orientation::Coronal => (self.width, self.depth),
            // Looking down x: z is width, y is height
            Orientation::Sagittal => (self.depth, self.height),
        }
    }

    /// Extract the slice at `index` along `orientation`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] when `index` is not below
    /// [`slice_count`](Self::slice_count) for that orientation.
    pub fn extract(&self, orientation: Orientation, index: usize) -> Result<FrameBuffer2D> {
        let bound = self.slice_count(orientation);
        if index >= bound {
            return Err(Error::IndexOutOfRange {
                orientation,
                index,
                bound,
            });
        }
        let index = index as u32;
        let (out_width, out_height) = self.output_dimensions(orientation);

        let pixels: Vec<Rgba8> = match orientation {
            Orientation::Axial => {
                let start = self.flat_index(0, 0, index);
                let end = start + self.width as usize * self.height as usize;
                self.voxels[start..end].to_vec()
            }
            // Each output row is row `index` of one z-plane
            Orientation::Coronal => (0..self.depth)
                .into_par_iter()
                .flat_map(|z| {
                    let start = self.flat_index(0, index, z);
                    self.voxels[start..start + self.width as usize].to_vec()
                })
                .collect(),
            // Each output row walks z at fixed (index, y), stride width * height
            Orientation::Sagittal => (0..self.height)
                .into_par_iter()
                .flat_map(|y| {
                    (0..self.depth)
                        .map(|z| self.voxels[self.flat_index(index, y, z)])
                        .collect::<Vec<Rgba8>>()
                })
                .collect(),
        };

        FrameBuffer2D::new(out_width, out_height, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voxel_color(x: u32, y: u32, z: u32) -> Rgba8 {
        [x as u8 * 10 + 1, y as u8 * 10 + 2, z as u8 * 10 + 3, 255]
    }

    /// Slices whose pixel at (x, y) in slice z is `voxel_color(x, y, z)`
    fn labelled_slices(width: u32, height: u32, depth: u32) -> Vec<FrameBuffer2D> {
        (0..depth)
            .map(|z| {
                let pixels = (0..height)
                    .flat_map(|y| (0..width).map(move |x| voxel_color(x, y, z)))
                    .collect();
                FrameBuffer2D::new(width, height, pixels).unwrap()
            })
            .collect()
    }

    fn px(r: u8, g: u8, b: u8) -> Rgba8 {
        [r, g, b, 255]
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            VolumeStore::build(&[], ResampleFilter::Bilinear),
            Err(Error::EmptyInput)
        ));
    }

    #[test]
    fn test_axial_matches_input_slices() {
        let slices = labelled_slices(3, 4, 5);
        let volume = VolumeStore::build(&slices, ResampleFilter::Bilinear).unwrap();
        assert_eq!(volume.dim(), (3, 4, 5));
        for (z, slice) in slices.iter().enumerate() {
            assert_eq!(&volume.extract(Orientation::Axial, z).unwrap(), slice);
        }
    }

    #[test]
    fn test_storage_layout() {
        let volume = VolumeStore::build(&labelled_slices(3, 2, 4), ResampleFilter::Nearest)
            .unwrap();
        assert_eq!(volume.flat_index(2, 1, 3), 3 * 6 + 3 + 2);
        assert_eq!(volume.voxels()[volume.flat_index(2, 1, 3)], voxel_color(2, 1, 3));
        assert_eq!(volume.view().unwrap()[[3, 1, 2]], voxel_color(2, 1, 3));
        assert_eq!(volume.voxel(3, 0, 0), None);
    }

    #[test]
    fn test_two_cubed_coronal_and_sagittal() {
        // z = 0: R G / B W    z = 1: C M / Y K
        let z0 = FrameBuffer2D::new(
            2,
            2,
            vec![px(255, 0, 0), px(0, 255, 0), px(0, 0, 255), px(255, 255, 255)],
        )
        .unwrap();
        let z1 = FrameBuffer2D::new(
            2,
            2,
            vec![px(0, 255, 255), px(255, 0, 255), px(255, 255, 0), px(0, 0, 0)],
        )
        .unwrap();
        let volume = VolumeStore::build(&[z0, z1], ResampleFilter::Nearest).unwrap();

        // Coronal y: row z holds voxel(x, y, z) for x = 0, 1
        let coronal0 = volume.extract(Orientation::Coronal, 0).unwrap();
        assert_eq!(coronal0.dim(), (2, 2));
        assert_eq!(
            coronal0.pixels(),
            &[px(255, 0, 0), px(0, 255, 0), px(0, 255, 255), px(255, 0, 255)]
        );
        let coronal1 = volume.extract(Orientation::Coronal, 1).unwrap();
        assert_eq!(
            coronal1.pixels(),
            &[px(0, 0, 255), px(255, 255, 255), px(255, 255, 0), px(0, 0, 0)]
        );

        // Sagittal x: row y holds voxel(x, y, z) for z = 0, 1
        let sagittal0 = volume.extract(Orientation::Sagittal, 0).unwrap();
        assert_eq!(
            sagittal0.pixels(),
            &[px(255, 0, 0), px(0, 255, 255), px(0, 0, 255), px(255, 255, 0)]
        );
        let sagittal1 = volume.extract(Orientation::Sagittal, 1).unwrap();
        assert_eq!(
            sagittal1.pixels(),
            &[px(0, 255, 0), px(255, 0, 255), px(255, 255, 255), px(0, 0, 0)]
        );
    }

    #[test]
    fn test_non_cubic_gathers_use_plane_stride() {
        let (width, height, depth) = (4, 3, 5);
        let volume =
            VolumeStore::build(&labelled_slices(width, height, depth), ResampleFilter::Nearest)
                .unwrap();

        let coronal = volume.extract(Orientation::Coronal, 2).unwrap();
        assert_eq!(coronal.dim(), (width, depth));
        for z in 0..depth {
            for x in 0..width {
                assert_eq!(coronal.pixel(x, z), Some(voxel_color(x, 2, z)));
            }
        }

        let sagittal = volume.extract(Orientation::Sagittal, 3).unwrap();
        assert_eq!(sagittal.dim(), (depth, height));
        for y in 0..height {
            for z in 0..depth {
                assert_eq!(sagittal.pixel(z, y), Some(voxel_color(3, y, z)));
            }
        }
    }

    #[test]
    fn test_index_out_of_range() {
        let volume = VolumeStore::build(&labelled_slices(4, 3, 2), ResampleFilter::Nearest)
            .unwrap();
        for (orientation, bound) in [
            (Orientation::Axial, 2),
            (Orientation::Coronal, 3),
            (Orientation::Sagittal, 4),
        ] {
            assert!(volume.extract(orientation, bound - 1).is_ok());
            for index in [bound, bound + 7] {
                match volume.extract(orientation, index) {
                    Err(Error::IndexOutOfRange {
                        orientation: o,
                        index: i,
                        bound: b,
                    }) => {
                        assert_eq!((o, i, b), (orientation, index, bound));
                    }
                    other => panic!("expected IndexOutOfRange, got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_mismatched_slice_is_resampled() {
        let first = FrameBuffer2D::solid(4, 4, px(10, 20, 30)).unwrap();
        let odd = FrameBuffer2D::solid(2, 3, px(90, 80, 70)).unwrap();
        let volume = VolumeStore::build(&[first, odd], ResampleFilter::Bilinear).unwrap();
        assert_eq!(volume.dim(), (4, 4, 2));
        let second = volume.extract(Orientation::Axial, 1).unwrap();
        assert_eq!(second.dim(), (4, 4));
        assert!(second.pixels().iter().all(|p| *p == px(90, 80, 70)));
    }

    #[test]
    fn test_same_size_slices_are_copied_verbatim() {
        let clear = FrameBuffer2D::solid(3, 2, [5, 6, 7, 0]).unwrap();
        let small = FrameBuffer2D::solid(1, 1, [5, 6, 7, 0]).unwrap();
        let volume =
            VolumeStore::build(&[clear.clone(), small], ResampleFilter::Nearest).unwrap();
        assert_eq!(volume.extract(Orientation::Axial, 0).unwrap(), clear);
        // Only resampled slices go through the opaque fit
        let fitted = volume.extract(Orientation::Axial, 1).unwrap();
        assert!(fitted.pixels().iter().all(|p| *p == [5, 6, 7, 255]));
    }
}
