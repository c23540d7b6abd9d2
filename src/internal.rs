use std::sync::atomic::{ AtomicUsize, Ordering };

use rand::Rng;

use crate::scalar::Real;


/// Process wide unique id for variables and graphs.

pub fn make_id() -> usize {
  static LAST_ID: AtomicUsize = AtomicUsize::new(0);
  LAST_ID.fetch_add(1, Ordering::Relaxed)
}


#[inline]
pub fn cast<T: Real>(value: f64) -> T {
  T::from(value).unwrap_or_else(T::nan)
}


// Polar Box-Muller transformation

pub fn randn<T: Real>() -> (T, T) {
  let mut rng = rand::thread_rng();
  loop {
    let u = rng.gen_range(-T::one(), T::one());
    let v = rng.gen_range(-T::one(), T::one());
    let r = u * u + v * v;
    // Try again if outside interval
    if r == T::zero() || r >= T::one() { continue }
    let c = (cast::<T>(-2.0) * r.ln() / r).sqrt();
    return (u * c, v * c)
  }
}
