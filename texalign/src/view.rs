use std::fmt::{Display, Formatter, Result as FmtResult};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;

use base::defs::{Error, ErrorKind::*, Result};

/// Keyframe number of a view that passed selection.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct ViewId(usize);

impl ViewId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for ViewId {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{:03}", self.0)
    }
}

pub type ViewMap<T> = IndexMap<ViewId, T>;

#[derive(Clone, Debug, PartialEq)]
pub struct ViewIndex {
    ids: Vec<ViewId>,
}

impl ViewIndex {
    /// An empty selection selects every keyframe.
    pub fn new(selection: &[usize], num_keyframes: usize) -> Result<Self> {
        if num_keyframes == 0 {
            return Err(Error::new(InvalidConfig, "no keyframes available"));
        }

        if selection.is_empty() {
            return Ok(Self {
                ids: (0..num_keyframes).map(ViewId).collect(),
            });
        }

        let mut ids = Vec::with_capacity(selection.len());
        for &index in selection {
            if index >= num_keyframes {
                let desc = format!(
                    "view {} is out of range, only {} keyframes available",
                    index, num_keyframes
                );
                return Err(Error::new(InvalidConfig, desc));
            }
            if ids.contains(&ViewId(index)) {
                let desc = format!("view {} is selected twice", index);
                return Err(Error::new(InvalidConfig, desc));
            }
            ids.push(ViewId(index));
        }

        Ok(Self { ids })
    }

    pub fn ids(&self) -> &[ViewId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn map<T, F: FnMut(ViewId) -> T>(&self, mut f: F) -> ViewMap<T> {
        self.ids.iter().map(|&id| (id, f(id))).collect()
    }

    pub fn par_map<T, F>(&self, f: F) -> ViewMap<T>
    where
        T: Send,
        F: Fn(ViewId) -> T + Sync,
    {
        let values: Vec<T> = self.ids.par_iter().map(|&id| f(id)).collect();
        self.ids.iter().cloned().zip(values).collect()
    }

    pub fn try_map<T, F>(&self, f: F) -> Result<ViewMap<T>>
    where
        F: FnMut(ViewId) -> Result<T>,
    {
        let mut f = f;
        self.ids.iter().map(|&id| Ok((id, f(id)?))).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_view_index_selection() {
        let all = ViewIndex::new(&[], 3).unwrap();
        assert_eq!(
            all.ids().iter().map(|id| id.index()).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let some = ViewIndex::new(&[2, 0], 3).unwrap();
        assert_eq!(some.len(), 2);
        assert_eq!(some.ids()[0].index(), 2);
        assert_eq!(format!("{}", some.ids()[0]), "002");
    }

    #[test]
    fn test_view_index_rejects_bad_selection() {
        assert_eq!(ViewIndex::new(&[], 0).unwrap_err().kind, InvalidConfig);
        assert_eq!(ViewIndex::new(&[3], 3).unwrap_err().kind, InvalidConfig);
        assert_eq!(
            ViewIndex::new(&[1, 1], 3).unwrap_err().kind,
            InvalidConfig
        );
    }

    #[test]
    fn test_view_maps_keep_order() {
        let index = ViewIndex::new(&[4, 1, 3], 5).unwrap();
        let squares = index.par_map(|id| id.index() * id.index());
        assert_eq!(squares.values().cloned().collect::<Vec<_>>(), vec![16, 1, 9]);
        let doubled = index.map(|id| id.index() * 2);
        assert_eq!(doubled[&index.ids()[2]], 6);
        let failed = index.try_map(|id| {
            if id.index() == 1 {
                Err(Error::new(MalformedData, "bad view"))
            } else {
                Ok(id.index())
            }
        });
        assert!(failed.is_err());
    }
}
