//! Utility routines around the MPI collectives used by the forest.

use itertools::Itertools;
use mpi::{
    collective::SystemOperation,
    datatype::{Partition, PartitionMut},
    traits::{CommunicatorCollectives, Equivalence, Root},
};

/// Compute displacements from a vector of counts.
///
/// This is useful for global MPI varcount operations. Let count be
/// `[3, 4, 5]`. Then the corresponding displacements are `[0, 3, 7]`. Note
/// that the last element `5` is ignored.
pub fn displacements(counts: &[i32]) -> Vec<i32> {
    counts
        .iter()
        .scan(0, |acc, &x| {
            let tmp = *acc;
            *acc += x;
            Some(tmp)
        })
        .collect()
}

/// Gather array to all processes.
pub fn gather_to_all<T: Equivalence, C: CommunicatorCollectives>(arr: &[T], comm: &C) -> Vec<T> {
    // First we need to broadcast the individual sizes on each process.

    let size = comm.size();

    let local_len = arr.len() as i32;

    let mut sizes = vec![0_i32; size as usize];

    comm.all_gather_into(&local_len, &mut sizes);

    let recv_len = sizes.iter().sum::<i32>() as usize;

    // Now we have the size of each local contribution.

    let mut recvbuffer = Vec::<T>::with_capacity(recv_len);
    let buf: &mut [T] = unsafe { std::mem::transmute(recvbuffer.spare_capacity_mut()) };

    let recv_displs = displacements(&sizes);

    let mut receiv_partition = PartitionMut::new(buf, sizes, &recv_displs[..]);

    comm.all_gather_varcount_into(arr, &mut receiv_partition);

    unsafe { recvbuffer.set_len(recv_len) };

    recvbuffer
}

/// Gather a distributed array to the root rank.
///
/// The result is a `Vec<T>` on root and `None` on all other ranks.
pub fn gather_to_root<T: Equivalence, C: CommunicatorCollectives>(
    arr: &[T],
    comm: &C,
) -> Option<Vec<T>> {
    let n = arr.len() as i32;
    let rank = comm.rank();
    let size = comm.size();
    let root_process = comm.process_at_rank(0);

    // We first communicate the length of the array to root.

    if rank == 0 {
        let mut counts = vec![0_i32; size as usize];
        root_process.gather_into_root(&n, &mut counts);

        // We now have all lengths at root and can do a varcount gather of
        // the actual elements.

        let nelements = counts.iter().sum::<i32>();
        let mut new_arr = Vec::<T>::with_capacity(nelements as usize);
        let new_arr_buf: &mut [T] = unsafe { std::mem::transmute(new_arr.spare_capacity_mut()) };

        let displs = displacements(counts.as_slice());

        let mut partition = PartitionMut::new(new_arr_buf, counts, &displs[..]);

        root_process.gather_varcount_into_root(arr, &mut partition);

        unsafe { new_arr.set_len(nelements as usize) };
        Some(new_arr)
    } else {
        root_process.gather_into(&n);
        root_process.gather_varcount_into(arr);
        None
    }
}

/// Get the global size of a distributed array.
pub fn global_size<T, C: CommunicatorCollectives>(arr: &[T], comm: &C) -> usize {
    let local_size = arr.len();
    let mut global_size = 0;

    comm.all_reduce_into(&local_size, &mut global_size, SystemOperation::sum());

    global_size
}

/// Inclusive cumulative sum of a distributed array.
///
/// Each rank scans its local array, then the local totals are shifted by an
/// exclusive scan across ranks so that the result is the global prefix sum.
pub fn global_inclusive_cumsum<C: CommunicatorCollectives>(arr: &[usize], comm: &C) -> Vec<usize> {
    let mut scan: Vec<usize> = arr
        .iter()
        .scan(0, |state, x| {
            *state += *x;
            Some(*state)
        })
        .collect_vec();

    let local_total = scan.last().copied().unwrap_or(0);
    let mut from_previous: usize = 0;
    comm.exclusive_scan_into(&local_total, &mut from_previous, SystemOperation::sum());

    // The exclusive scan leaves rank 0 undefined; its offset is zero.
    if comm.rank() > 0 {
        for elem in &mut scan {
            *elem += from_previous;
        }
    }

    scan
}

/// Count how many elements of a sorted array fall into each bin.
///
/// `bins` holds the first element of each bin in ascending order; the last
/// bin is unbounded above and elements below the first bin count towards it.
pub fn sort_to_bins<T: Ord>(sorted: &[T], bins: &[T]) -> Vec<usize> {
    let mut counts = Vec::with_capacity(bins.len());
    let mut start = 0;
    for bin in bins.iter().skip(1) {
        let end = start + sorted[start..].partition_point(|elem| elem < bin);
        counts.push(end - start);
        start = end;
    }
    counts.push(sorted.len() - start);
    counts
}

/// Redistribute an array via an all-to-all varcount exchange.
///
/// `counts[r]` elements, in order, are sent to rank `r`; the received
/// contributions are returned in rank order.
pub fn redistribute<T: Equivalence, C: CommunicatorCollectives>(
    arr: &[T],
    counts: &[i32],
    comm: &C,
) -> Vec<T> {
    let size = comm.size() as usize;
    assert_eq!(counts.len(), size, "one send count per rank required");

    // First communicate how many elements everybody gets from each process.

    let mut counts_from_processor = vec![0_i32; size];
    comm.all_to_all_into(counts, &mut counts_from_processor);

    // Now send around the actual elements with an alltoallv.

    let send_displs = displacements(counts);
    let send_partition = Partition::new(arr, counts.to_vec(), &send_displs[..]);

    let recv_len = counts_from_processor.iter().sum::<i32>() as usize;
    let mut recvbuffer = Vec::<T>::with_capacity(recv_len);
    let buf: &mut [T] = unsafe { std::mem::transmute(recvbuffer.spare_capacity_mut()) };

    let recv_displs = displacements(&counts_from_processor);
    let mut receiv_partition = PartitionMut::new(buf, counts_from_processor, &recv_displs[..]);

    comm.all_to_all_varcount_into(&send_partition, &mut receiv_partition);

    unsafe { recvbuffer.set_len(recv_len) };

    recvbuffer
}

/// Distribute globally sorted elements into contiguous equal slices, one
/// per rank, with count imbalance at most one. Used by the space-filling-
/// curve repartition with cells already sorted by [`crate::parsort::parsort`].
pub fn partition_evenly<T: Equivalence + Ord + Copy, C: CommunicatorCollectives>(
    sorted: &[T],
    comm: &C,
) -> Vec<T> {
    let size = comm.size() as usize;
    if size == 1 {
        return sorted.to_vec();
    }

    let scan = global_inclusive_cumsum(&vec![1_usize; sorted.len()], comm);
    let total = global_size(sorted, comm);

    let w = total / size;
    let k = total % size;

    // The first element of each rank's slice in scan coordinates.
    let mut bins = Vec::with_capacity(size);
    for p in 1..=size {
        if p <= k {
            bins.push((p - 1) * (1 + w));
        } else {
            bins.push((p - 1) * w + k);
        }
    }

    let counts: Vec<i32> = sort_to_bins(&scan, &bins)
        .iter()
        .map(|&c| c as i32)
        .collect();

    let mut mine = redistribute(sorted, &counts, comm);
    mine.sort_unstable();
    mine
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_displacements() {
        assert_eq!(displacements(&[3, 4, 5]), vec![0, 3, 7]);
        assert_eq!(displacements(&[]), Vec::<i32>::new());
    }

    #[test]
    fn test_sort_to_bins() {
        let sorted = [1, 2, 4, 4, 7, 9, 12];
        assert_eq!(sort_to_bins(&sorted, &[0, 4, 10]), vec![2, 4, 1]);
        // Elements below the first bin land in it.
        assert_eq!(sort_to_bins(&sorted, &[2, 10]), vec![6, 1]);
    }

    #[test]
    fn test_sort_to_bins_empty_bins() {
        let sorted = [5, 6];
        assert_eq!(sort_to_bins(&sorted, &[0, 1, 2, 10]), vec![0, 0, 2, 0]);
    }
}
