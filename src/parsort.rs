//! Implementation of a parallel samplesort.
//!
//! The space-filling-curve repartition sorts all leaves of the forest by
//! their (block, Morton) position across ranks. The samplesort picks a set
//! of random splitters, gathers them everywhere, and redistributes the
//! elements into the per-rank buckets the splitters define.

use std::mem::offset_of;

use itertools::Itertools;
use mpi::datatype::{UncommittedDatatypeRef, UncommittedUserDatatype, UserDatatype};
use mpi::traits::{CommunicatorCollectives, Equivalence};
use rand::{seq::SliceRandom, Rng};

use crate::octant::Octant;
use crate::quadrant::Quadrant;
use crate::tools::{gather_to_all, redistribute, sort_to_bins};

const OVERSAMPLING: usize = 8;

/// Return the minimum possible value of a type.
pub trait MinValue {
    /// Return the min value.
    fn min_value() -> Self;
}

/// Return the maximum possible value of a type.
pub trait MaxValue {
    /// Return the max value.
    fn max_value() -> Self;
}

/// Bound for the types that can be fed into [`parsort`].
pub trait ParallelSortable:
    MinValue + MaxValue + Equivalence + Copy + Clone + Default + PartialEq + Eq + PartialOrd + Ord
{
}

impl<T: MinValue + MaxValue + Equivalence + Copy + Clone + Default + PartialEq + Eq + PartialOrd + Ord>
    ParallelSortable for T
{
}

/// An internal struct. We convert every array element into this struct. The
/// idea is that this is guaranteed to be unique as it encodes not only the
/// element but also its rank and index.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
struct UniqueItem<T: ParallelSortable> {
    pub value: T,
    pub rank: usize,
    pub index: usize,
}

unsafe impl<T: ParallelSortable> Equivalence for UniqueItem<T> {
    type Out = UserDatatype;

    // Depending on the MPI implementation the offsets below are i64 or
    // isize, so the conversion is not always a no-op.

    #[allow(clippy::useless_conversion)]
    fn equivalent_datatype() -> Self::Out {
        UserDatatype::structured::<UncommittedDatatypeRef>(
            &[1, 1, 1],
            &[
                (offset_of!(UniqueItem<T>, value) as i64)
                    .try_into()
                    .unwrap(),
                (offset_of!(UniqueItem<T>, rank) as i64).try_into().unwrap(),
                (offset_of!(UniqueItem<T>, index) as i64)
                    .try_into()
                    .unwrap(),
            ],
            &[
                UncommittedUserDatatype::contiguous(1, &<T as Equivalence>::equivalent_datatype())
                    .as_ref(),
                usize::equivalent_datatype().into(),
                usize::equivalent_datatype().into(),
            ],
        )
    }
}

impl<T: ParallelSortable> MinValue for UniqueItem<T> {
    fn min_value() -> Self {
        UniqueItem::new(<T as MinValue>::min_value(), 0, 0)
    }
}

impl<T: ParallelSortable> MaxValue for UniqueItem<T> {
    fn max_value() -> Self {
        UniqueItem::new(<T as MaxValue>::max_value(), 0, 0)
    }
}

impl<T: ParallelSortable> UniqueItem<T> {
    pub fn new(value: T, rank: usize, index: usize) -> Self {
        Self { value, rank, index }
    }
}

fn to_unique_item<T: ParallelSortable>(arr: &[T], rank: usize) -> Vec<UniqueItem<T>> {
    arr.iter()
        .enumerate()
        .map(|(index, &item)| UniqueItem::new(item, rank, index))
        .collect()
}

/// Pick the first element of each rank's bucket from a random oversampled
/// set of splitters, gathered and agreed upon by all ranks.
fn get_bins<T, C, R>(arr: &[UniqueItem<T>], comm: &C, rng: &mut R) -> Vec<UniqueItem<T>>
where
    T: ParallelSortable,
    C: CommunicatorCollectives,
    R: Rng + ?Sized,
{
    let size = comm.size() as usize;

    let oversampling = if arr.len() < OVERSAMPLING {
        arr.len()
    } else {
        OVERSAMPLING
    };

    let splitters = arr
        .choose_multiple(rng, oversampling)
        .copied()
        .collect::<Vec<_>>();

    // Every rank gets every splitter, so after sorting all ranks agree on
    // the same bucket boundaries.

    let mut all_splitters = gather_to_all(&splitters, comm);
    all_splitters.sort_unstable();

    if *all_splitters.first().unwrap() != UniqueItem::min_value() {
        all_splitters.insert(0, UniqueItem::min_value())
    }

    let nsplitters = all_splitters.len();
    (0..size)
        .map(|p| all_splitters[(p * nsplitters) / size])
        .collect_vec()
}

/// Parallel sort.
pub fn parsort<T: ParallelSortable, C: CommunicatorCollectives, R: Rng + ?Sized>(
    arr: &[T],
    comm: &C,
    rng: &mut R,
) -> Vec<T> {
    let size = comm.size() as usize;
    let rank = comm.rank() as usize;

    // If we only have a single rank simply sort the local array and return.

    if size == 1 {
        let mut arr = arr.to_vec();
        arr.sort_unstable();
        return arr;
    }

    // We first convert the array into unique elements by adding information
    // about index and rank. This guarantees that we don't have duplicates in
    // our sorting set.

    let mut arr = to_unique_item(arr, rank);
    arr.sort_unstable();

    // All ranks agree on the bucket boundaries, count their elements per
    // bucket and redistribute accordingly.

    let bins = get_bins(&arr, comm, rng);

    let counts = sort_to_bins(&arr, &bins)
        .iter()
        .map(|&elem| elem as i32)
        .collect_vec();

    let mut recvbuffer = redistribute(&arr, &counts, comm);

    recvbuffer.sort_unstable();
    recvbuffer.iter().map(|&elem| elem.value).collect_vec()
}

impl MinValue for Octant {
    fn min_value() -> Self {
        Octant::root(i32::MIN)
    }
}

impl MaxValue for Octant {
    fn max_value() -> Self {
        Octant::root(i32::MAX)
    }
}

impl MinValue for Quadrant {
    fn min_value() -> Self {
        Quadrant::root(i32::MIN)
    }
}

impl MaxValue for Quadrant {
    fn max_value() -> Self {
        Quadrant::root(i32::MAX)
    }
}

macro_rules! impl_min_max_value {
    ($type:ty) => {
        impl MinValue for $type {
            fn min_value() -> Self {
                <$type>::MIN
            }
        }

        impl MaxValue for $type {
            fn max_value() -> Self {
                <$type>::MAX
            }
        }
    };
}

impl_min_max_value!(usize);
impl_min_max_value!(i8);
impl_min_max_value!(i32);
impl_min_max_value!(i64);
impl_min_max_value!(u8);
impl_min_max_value!(u32);
impl_min_max_value!(u64);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sentinels_bound_all_cells() {
        let o = Octant::new(17, 5, 0, 1 << 20, 0);
        assert!(Octant::min_value() < o);
        assert!(o < Octant::max_value());
        let q = Quadrant::new(-3, 2, 0, 0);
        assert!(Quadrant::min_value() < q);
        assert!(q < Quadrant::max_value());
    }
}
