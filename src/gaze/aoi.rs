// AOI catalogue kept per stimulus

use serde::{Deserialize, Serialize};

use crate::{errors::GazeError, visibility::VisibilityAoiData};

const AOI_PALETTE: [&str; 12] = [
    "#66c5cc", "#f6cf71", "#f89c74", "#dcb0f2", "#87c55f", "#9eb9f3", "#fe88b1", "#c9db74",
    "#8be0a4", "#b497e7", "#d3b484", "#b3b3b3",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AoiInfo {
    /// Name as found in the source file
    pub original_name: String,
    /// Name shown in plots, initially the original name
    pub displayed_name: String,
    pub color: String,
}

/// AOIs of every stimulus plus display order and visibility.
///
/// `data[stimulus_id][aoi_id]` holds the AOI; ids are assigned per stimulus in
/// first-seen order. An empty `order_vector[stimulus_id]` means first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AoiData {
    pub data: Vec<Vec<AoiInfo>>,
    pub order_vector: Vec<Vec<usize>>,
    pub dynamic_visibility: VisibilityAoiData,
}

impl AoiData {
    pub(crate) fn ensure_stimulus(&mut self, stimulus_id: usize) {
        if self.data.len() <= stimulus_id {
            self.data.resize_with(stimulus_id + 1, Vec::new);
            self.order_vector.resize_with(stimulus_id + 1, Vec::new);
        }
    }

    pub fn aoi_id(&self, stimulus_id: usize, name: &str) -> Option<usize> {
        self.data
            .get(stimulus_id)?
            .iter()
            .position(|aoi| aoi.original_name == name)
    }

    /// Returns the id of `name` within the stimulus, registering it on first sight.
    pub(crate) fn intern(&mut self, stimulus_id: usize, name: &str) -> usize {
        if let Some(id) = self.aoi_id(stimulus_id, name) {
            return id;
        }
        self.ensure_stimulus(stimulus_id);
        let aois = &mut self.data[stimulus_id];
        aois.push(AoiInfo {
            original_name: name.to_string(),
            displayed_name: name.to_string(),
            color: AOI_PALETTE[aois.len() % AOI_PALETTE.len()].to_string(),
        });
        if !self.order_vector[stimulus_id].is_empty() {
            self.order_vector[stimulus_id].push(aois.len() - 1);
        }
        aois.len() - 1
    }

    pub fn aois(&self, stimulus_id: usize) -> &[AoiInfo] {
        self.data.get(stimulus_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// AOI ids of the stimulus in display order.
    pub fn ordered(&self, stimulus_id: usize) -> Vec<usize> {
        match self.order_vector.get(stimulus_id) {
            Some(order) if !order.is_empty() => order.clone(),
            _ => (0..self.aois(stimulus_id).len()).collect(),
        }
    }

    /// Sets the display order; `order` must be a permutation of the stimulus' AOI ids.
    pub fn set_order(&mut self, stimulus_id: usize, order: Vec<usize>) -> Result<(), GazeError> {
        let count = self.aois(stimulus_id).len();
        let mut seen = vec![false; count];
        let is_permutation = order.len() == count
            && order.iter().all(|&id| {
                id < count && !std::mem::replace(&mut seen[id], true)
            });
        if !is_permutation || stimulus_id >= self.data.len() {
            return Err(GazeError::InvalidAoiOrder { stimulus_id });
        }
        self.order_vector[stimulus_id] = order;
        Ok(())
    }

    pub fn rename(&mut self, stimulus_id: usize, aoi_id: usize, displayed_name: &str) -> bool {
        match self
            .data
            .get_mut(stimulus_id)
            .and_then(|aois| aois.get_mut(aoi_id))
        {
            Some(aoi) => {
                aoi.displayed_name = displayed_name.to_string();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_per_stimulus() {
        let mut aois = AoiData::default();
        assert_eq!(aois.intern(0, "Face"), 0);
        assert_eq!(aois.intern(0, "Hands"), 1);
        assert_eq!(aois.intern(0, "Face"), 0);
        assert_eq!(aois.intern(1, "Hands"), 0);
        assert_eq!(aois.aois(0)[1].color, AOI_PALETTE[1]);
        assert_eq!(aois.aoi_id(1, "Face"), None);
    }

    #[test]
    fn test_order_must_be_permutation() {
        let mut aois = AoiData::default();
        aois.intern(0, "A");
        aois.intern(0, "B");
        assert_eq!(aois.ordered(0), vec![0, 1]);
        assert!(aois.set_order(0, vec![1, 1]).is_err());
        assert!(aois.set_order(0, vec![1]).is_err());
        assert!(aois.set_order(3, vec![]).is_err());
        aois.set_order(0, vec![1, 0]).unwrap();
        assert_eq!(aois.ordered(0), vec![1, 0]);
        aois.intern(0, "C");
        assert_eq!(aois.ordered(0), vec![1, 0, 2]);
    }

    #[test]
    fn test_rename_keeps_original() {
        let mut aois = AoiData::default();
        aois.intern(0, "aoi_1");
        assert!(aois.rename(0, 0, "Logo"));
        assert_eq!(aois.aois(0)[0].original_name, "aoi_1");
        assert_eq!(aois.aois(0)[0].displayed_name, "Logo");
        assert!(!aois.rename(0, 4, "x"));
    }
}
