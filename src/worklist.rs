use log::debug;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::iter::FromIterator;

/// Keeps track of the locations which need to be processed again because the
/// frame flowing into them has changed.
///
/// Locations are handed out lowest first, so a run over the same graph always
/// visits locations in the same order.
///
/// To construct a `Worklist`, use its `FromIterator` implementation (i.e., use
/// `.collect()` on an iterator)
pub struct Worklist<T: Ord> {
    locations: BTreeSet<T>,
}

impl<T: Ord + Copy + Debug> Worklist<T> {
    /// Adds the given location to the worklist. Adding a location which is
    /// already on the worklist has no effect.
    pub fn add(&mut self, location: T) {
        if self.locations.insert(location) {
            debug!("Adding {:?} to worklist", location);
        }
    }

    /// Removes the lowest location from the worklist and returns it
    ///
    /// Returns `None` if the worklist was empty
    pub fn pop(&mut self) -> Option<T> {
        let location = *self.locations.iter().next()?;
        self.locations.remove(&location);
        debug!("Popped {:?} from worklist", location);
        Some(location)
    }
}

impl<T: Ord> FromIterator<T> for Worklist<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            locations: iter.into_iter().collect(),
        }
    }
}
