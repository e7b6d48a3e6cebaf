use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded random source shared by every randomized component of one chain.
///
/// Clones draw from the same stream, so a run is reproducible from its seed
/// no matter how many searchers consult it.
#[derive(Clone, Debug)]
pub struct SharedRng(Rc<RefCell<StdRng>>);

impl SharedRng {
    pub fn seeded(seed: u64) -> Self {
        Self(Rc::new(RefCell::new(StdRng::seed_from_u64(seed))))
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn index(&self, len: usize) -> usize {
        self.0.borrow_mut().gen_range(0..len)
    }

    /// Uniform value in `[0, 1)`.
    pub fn unit(&self) -> f64 {
        self.0.borrow_mut().gen::<f64>()
    }
}
