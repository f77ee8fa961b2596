//! Launch grid: local and global sizes and the checks run on them before
//! any device work happens.

use crate::backend::DeviceLimits;
use crate::error::{LaunchError, LaunchResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCAL_SIZE: usize = 32;
pub const DEFAULT_GLOBAL_SIZE: usize = 1024;
pub const MAX_DIMS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    local: Vec<usize>,
    global: Vec<usize>,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            local: vec![DEFAULT_LOCAL_SIZE],
            global: vec![DEFAULT_GLOBAL_SIZE],
        }
    }
}

/// Parse `"8,8"` into sizes. `which` names the flag in errors.
pub fn parse_sizes(text: &str, which: &str) -> LaunchResult<Vec<usize>> {
    text.split(',')
        .map(|tok| {
            tok.trim().parse::<usize>().map_err(|_| {
                LaunchError::config(format!("Could not parse {which} size \"{text}\""))
            })
        })
        .collect()
}

impl Grid {
    /// Validated grid. Missing sides take the 1-D defaults.
    pub fn new(local: Option<Vec<usize>>, global: Option<Vec<usize>>) -> LaunchResult<Self> {
        let local = local.unwrap_or_else(|| vec![DEFAULT_LOCAL_SIZE]);
        let global = global.unwrap_or_else(|| vec![DEFAULT_GLOBAL_SIZE]);
        if local.len() != global.len() {
            return Err(LaunchError::config(
                "Local and global sizes must have same number of dimensions!",
            ));
        }
        if local.len() > MAX_DIMS {
            return Err(LaunchError::config("Cannot have more than 3 dimensions!"));
        }
        for (d, (&l, &g)) in local.iter().zip(&global).enumerate() {
            if l == 0 || g == 0 {
                return Err(LaunchError::config(format!(
                    "Size in dimension {d} must be non-zero"
                )));
            }
            if l > g {
                return Err(LaunchError::config(format!(
                    "Local dimension {d} greater than global dimension!"
                )));
            }
            if g % l != 0 {
                return Err(LaunchError::config(format!(
                    "Global size {g} in dimension {d} is not a multiple of local size {l}"
                )));
            }
        }
        Ok(Self { local, global })
    }

    #[must_use]
    pub fn local(&self) -> &[usize] {
        &self.local
    }

    #[must_use]
    pub fn global(&self) -> &[usize] {
        &self.global
    }

    /// Number of dimensions (local and global agree).
    #[must_use]
    pub fn dims(&self) -> usize {
        self.local.len()
    }

    #[must_use]
    pub fn total_threads(&self) -> usize {
        self.global.iter().product()
    }

    #[must_use]
    pub fn group_size(&self) -> usize {
        self.local.iter().product()
    }

    /// Work-groups in the whole launch.
    #[must_use]
    pub fn groups(&self) -> usize {
        self.total_threads() / self.group_size()
    }

    /// Groups along each dimension.
    #[must_use]
    pub fn groups_per_dim(&self) -> Vec<usize> {
        self.global
            .iter()
            .zip(&self.local)
            .map(|(g, l)| g / l)
            .collect()
    }

    #[must_use]
    pub fn max_global(&self) -> usize {
        self.global.iter().copied().max().unwrap_or(0)
    }

    /// Check the grid against what the selected device supports.
    pub fn check_limits(&self, limits: &DeviceLimits) -> LaunchResult<()> {
        if self.dims() > limits.max_dims {
            return Err(LaunchError::device(format!(
                "Kernel uses {} dimensions, exceeds the maximum of {} dimensions for this device",
                self.dims(),
                limits.max_dims
            )));
        }
        for (d, &l) in self.local.iter().enumerate() {
            let max = limits.max_local.get(d).copied().unwrap_or(0);
            if l > max {
                return Err(LaunchError::device(format!(
                    "Local work size in dimension {d} is {l}, which exceeds maximum of {max} for this device"
                )));
            }
        }
        if self.group_size() > limits.max_group_size {
            return Err(LaunchError::device(format!(
                "Kernel work group size is {}, which exceeds the maximum work group size of {} for this device",
                self.group_size(),
                limits.max_group_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_one_dimensional() {
        let grid = Grid::new(None, None).unwrap();
        assert_eq!(grid, Grid::default());
        assert_eq!(grid.total_threads(), 1024);
        assert_eq!(grid.groups(), 32);
    }

    #[test]
    fn two_dimensional_counts() {
        let grid = Grid::new(Some(vec![8, 8]), Some(vec![64, 64])).unwrap();
        assert_eq!(grid.dims(), 2);
        assert_eq!(grid.total_threads(), 4096);
        assert_eq!(grid.groups(), 64);
        assert_eq!(grid.groups_per_dim(), vec![8, 8]);
    }

    #[test]
    fn parse_sizes_rejects_garbage() {
        assert_eq!(parse_sizes("8,8", "local").unwrap(), vec![8, 8]);
        let err = parse_sizes("8,x", "local").unwrap_err();
        assert!(err.to_string().contains("local size \"8,x\""));
    }

    #[test]
    fn mismatched_dimensions() {
        let err = Grid::new(Some(vec![8]), Some(vec![64, 64])).unwrap_err();
        assert!(err.to_string().contains("same number of dimensions"));
    }

    #[test]
    fn too_many_dimensions() {
        let err = Grid::new(Some(vec![1; 4]), Some(vec![1; 4])).unwrap_err();
        assert!(err.to_string().contains("more than 3 dimensions"));
    }

    #[test]
    fn local_larger_than_global_names_dimension() {
        let err = Grid::new(Some(vec![8, 128]), Some(vec![64, 64])).unwrap_err();
        assert!(err.to_string().contains("Local dimension 1 greater"));
    }

    #[test]
    fn indivisible_global() {
        let err = Grid::new(Some(vec![3]), Some(vec![10])).unwrap_err();
        assert!(err.to_string().contains("not a multiple"));
    }

    #[test]
    fn zero_size() {
        assert!(Grid::new(Some(vec![0]), Some(vec![8])).is_err());
    }

    #[test]
    fn device_limits() {
        let limits = DeviceLimits {
            max_dims: 2,
            max_local: vec![16, 16],
            max_group_size: 128,
        };
        let ok = Grid::new(Some(vec![8, 8]), Some(vec![64, 64])).unwrap();
        assert!(ok.check_limits(&limits).is_ok());

        let wide = Grid::new(Some(vec![32, 1]), Some(vec![64, 64])).unwrap();
        let err = wide.check_limits(&limits).unwrap_err();
        assert!(err.to_string().contains("dimension 0 is 32"));

        let big = Grid::new(Some(vec![16, 16]), Some(vec![64, 64])).unwrap();
        assert!(big.check_limits(&limits).unwrap_err().to_string().contains("256"));

        let deep = Grid::new(Some(vec![1, 1, 1]), Some(vec![1, 1, 1])).unwrap();
        assert!(deep.check_limits(&limits).is_err());
    }
}
