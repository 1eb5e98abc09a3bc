//! Ordered set of cameras contributing to coverage

use super::{CoverageError, CoverageResult};
use crate::scene::VirtualCamera;

/// Cameras in slot order. Slot `i` of the coverage program belongs to the
/// camera at index `i`.
#[derive(Debug, Clone)]
pub struct ActiveCameraSet {
    cameras: Vec<VirtualCamera>,
    capacity: usize,
    generation: u64,
}

impl ActiveCameraSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            cameras: Vec::with_capacity(capacity),
            capacity,
            generation: 0,
        }
    }

    /// Append `camera`. Names are unique and the set never grows past its
    /// capacity.
    pub fn insert(&mut self, camera: VirtualCamera) -> CoverageResult<usize> {
        if self.position(camera.name()).is_some() {
            return Err(CoverageError::DuplicateCamera(camera.name().to_string()));
        }
        if self.cameras.len() >= self.capacity {
            return Err(CoverageError::CapacityExceeded {
                capacity: self.capacity as u32,
            });
        }
        self.cameras.push(camera);
        self.generation += 1;
        Ok(self.cameras.len() - 1)
    }

    /// Remove by name, shifting later cameras down one slot
    pub fn remove(&mut self, name: &str) -> Option<VirtualCamera> {
        let index = self.position(name)?;
        self.generation += 1;
        Some(self.cameras.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&VirtualCamera> {
        self.cameras.iter().find(|c| c.name() == name)
    }

    /// Mutable access for in-place edits. Slots keep their order so the
    /// binding set stays valid.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut VirtualCamera> {
        self.cameras.iter_mut().find(|c| c.name() == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.cameras.iter().position(|c| c.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualCamera> {
        self.cameras.iter()
    }

    pub fn as_slice(&self) -> &[VirtualCamera] {
        &self.cameras
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) -> CoverageResult<()> {
        if capacity < self.cameras.len() {
            return Err(CoverageError::CapacityBelowActive {
                requested: capacity as u32,
                active: self.cameras.len() as u32,
            });
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Bumped whenever slot assignment changes
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::OpticalSettings;

    fn camera(name: &str) -> VirtualCamera {
        VirtualCamera::new(name, OpticalSettings::default()).unwrap()
    }

    #[test]
    fn test_insert_respects_capacity() {
        let mut set = ActiveCameraSet::new(2);
        assert_eq!(set.insert(camera("a")).unwrap(), 0);
        assert_eq!(set.insert(camera("b")).unwrap(), 1);
        assert!(matches!(
            set.insert(camera("c")),
            Err(CoverageError::CapacityExceeded { capacity: 2 })
        ));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut set = ActiveCameraSet::new(4);
        set.insert(camera("a")).unwrap();
        assert!(matches!(
            set.insert(camera("a")),
            Err(CoverageError::DuplicateCamera(name)) if name == "a"
        ));
    }

    #[test]
    fn test_remove_shifts_slots() {
        let mut set = ActiveCameraSet::new(4);
        for name in ["a", "b", "c"] {
            set.insert(camera(name)).unwrap();
        }
        let generation = set.generation();
        assert_eq!(set.remove("a").unwrap().name(), "a");
        assert_eq!(set.position("c"), Some(1));
        assert!(set.generation() > generation);
        assert!(set.remove("a").is_none());
    }

    #[test]
    fn test_capacity_cannot_drop_below_active() {
        let mut set = ActiveCameraSet::new(4);
        set.insert(camera("a")).unwrap();
        set.insert(camera("b")).unwrap();
        assert!(set.set_capacity(1).is_err());
        set.set_capacity(2).unwrap();
        assert_eq!(set.capacity(), 2);
    }
}
