/// Average ranks (1-based) of `values`, plus the tie term `Σ (t³ - t)` over
/// every group of `t` tied values.
pub fn rank_average(values: &[f64]) -> (Vec<f64>, f64) {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && values[order[j]] == values[order[i]] {
            j += 1;
        }
        // positions i..j share the average of ranks i+1..=j
        let avg = (i + j + 1) as f64 / 2.0;
        for &k in &order[i..j] {
            ranks[k] = avg;
        }
        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        i = j;
    }
    (ranks, tie_term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_ties() {
        let (ranks, ties) = rank_average(&[10.0, 30.0, 20.0]);
        assert_eq!(ranks, [1.0, 3.0, 2.0]);
        assert_eq!(ties, 0.0);
    }

    #[test]
    fn ties_share_the_average_rank() {
        let (ranks, ties) = rank_average(&[3.0, 1.0, 3.0, 2.0, 1.0, 1.0]);
        assert_eq!(ranks, [5.5, 2.0, 5.5, 4.0, 2.0, 2.0]);
        // one group of three, one of two
        assert_eq!(ties, 24.0 + 6.0);
    }
}
