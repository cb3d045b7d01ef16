//! Integer circuits over XOR-shared integers.
//!
//! Every function works on a batch and evaluates the gates of one circuit
//! layer for all batch elements in a single [`and_many`] call, so the number
//! of rounds depends on widths only and the number of gates on widths and
//! batch sizes only. Operands inside one batch share a width.

use crate::{
    error::Error,
    execution::session::Session,
    protocol::binary::and_many,
    shares::{BitShare, IntShare},
};
use eyre::Result;
use itertools::izip;
use janus_mpc_common::{bit_length, ceil_log2};
use tracing::instrument;

/// Rounding of [`scale_and_shift_many`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    /// `(x * n) >> f`
    Floor,
    /// `(x * n + 2^f - 1) >> f`
    Ceil,
}

fn batch_width(x: &[IntShare], y: &[IntShare]) -> Result<usize> {
    if x.len() != y.len() {
        return Err(Error::InvalidInput(format!(
            "batch operands differ in length: {} vs {}",
            x.len(),
            y.len()
        ))
        .into());
    }
    let width = x.first().map_or(0, IntShare::width);
    for v in x.iter().chain(y.iter()) {
        if v.width() != width {
            return Err(Error::WidthMismatch(width, v.width()).into());
        }
    }
    Ok(width)
}

/// Ripple-carry addition `x + y + carry_in`. Returns the sums in the operand
/// width and, if requested, the carry-out bits. One AND per bit position:
/// `carry' = c ^ ((a ^ c) & (b ^ c))`.
async fn ripple_add(
    session: &mut Session,
    x: &[IntShare],
    y: &[IntShare],
    carry_in: Option<Vec<BitShare>>,
    with_carry_out: bool,
) -> Result<(Vec<IntShare>, Vec<BitShare>)> {
    let width = batch_width(x, y)?;
    let n = x.len();
    let mut carry = carry_in.unwrap_or_else(|| vec![BitShare::default(); n]);
    if carry.len() != n {
        return Err(Error::InvalidInput("carry-in does not match the batch".to_string()).into());
    }
    let mut sums: Vec<Vec<BitShare>> = vec![Vec::with_capacity(width); n];

    for i in 0..width {
        let mut lhs = Vec::with_capacity(n);
        let mut rhs = Vec::with_capacity(n);
        for (x, y, c, s) in izip!(x, y, &carry, &mut sums) {
            let (a, b) = (x.bit(i), y.bit(i));
            s.push(a ^ b ^ *c);
            lhs.push(a ^ *c);
            rhs.push(b ^ *c);
        }
        if i + 1 < width || with_carry_out {
            let prod = and_many(session, &lhs, &rhs).await?;
            for (c, p) in izip!(&mut carry, prod) {
                *c ^= p;
            }
        }
    }
    let sums = sums.into_iter().map(IntShare::from_bits).collect();
    Ok((sums, carry))
}

/// `x + y mod 2^w`.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(batch = x.len()))]
pub async fn add_many(
    session: &mut Session,
    x: &[IntShare],
    y: &[IntShare],
) -> Result<Vec<IntShare>> {
    Ok(ripple_add(session, x, y, None, false).await?.0)
}

/// `x + y` in `w + 1` bits.
pub async fn add_extend_many(
    session: &mut Session,
    x: &[IntShare],
    y: &[IntShare],
) -> Result<Vec<IntShare>> {
    let (sums, carries) = ripple_add(session, x, y, None, true).await?;
    Ok(izip!(sums, carries)
        .map(|(s, c)| {
            let mut bits = s.into_bits();
            bits.push(c);
            IntShare::from_bits(bits)
        })
        .collect())
}

fn complement(session: &Session, y: &[IntShare]) -> (Vec<IntShare>, Vec<BitShare>) {
    let role = session.own_role();
    (
        y.iter().map(|v| v.not(role)).collect(),
        vec![BitShare::from_const(true, role); y.len()],
    )
}

/// `x - y mod 2^w`, computed as `x + !y + 1`.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(batch = x.len()))]
pub async fn sub_many(
    session: &mut Session,
    x: &[IntShare],
    y: &[IntShare],
) -> Result<Vec<IntShare>> {
    let (not_y, ones) = complement(session, y);
    Ok(ripple_add(session, x, &not_y, Some(ones), false).await?.0)
}

/// Unsigned `x >= y`: the carry-out of `x + !y + 1`.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(batch = x.len()))]
pub async fn ge_many(
    session: &mut Session,
    x: &[IntShare],
    y: &[IntShare],
) -> Result<Vec<BitShare>> {
    let (not_y, ones) = complement(session, y);
    Ok(ripple_add(session, x, &not_y, Some(ones), true).await?.1)
}

/// Unsigned `x < y`.
pub async fn lt_many(
    session: &mut Session,
    x: &[IntShare],
    y: &[IntShare],
) -> Result<Vec<BitShare>> {
    let role = session.own_role();
    let ge = ge_many(session, x, y).await?;
    Ok(ge.into_iter().map(|b| b.not(role)).collect())
}

/// Unsigned `x < c` for a public constant `c` that fits the operand width.
pub async fn lt_const_many(
    session: &mut Session,
    x: &[IntShare],
    c: u64,
) -> Result<Vec<BitShare>> {
    if let Some(narrow) = x.iter().find(|v| bit_length(c) > v.width()) {
        return Err(Error::WidthMismatch(narrow.width(), bit_length(c)).into());
    }
    let role = session.own_role();
    let ys: Vec<IntShare> = x
        .iter()
        .map(|v| IntShare::from_const(c, v.width(), role))
        .collect();
    lt_many(session, x, &ys).await
}

/// Sums every group with a balanced adder tree, all groups advancing one
/// tree level per [`add_many`] call. Every summand has `width` bits and the
/// sums wrap modulo `2^width`.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(groups = groups.len()))]
pub async fn sum_many(
    session: &mut Session,
    mut groups: Vec<Vec<IntShare>>,
    width: usize,
) -> Result<Vec<IntShare>> {
    if let Some(bad) = groups.iter().flatten().find(|v| v.width() != width) {
        return Err(Error::WidthMismatch(width, bad.width()).into());
    }
    while groups.iter().any(|g| g.len() > 1) {
        let mut lhs = Vec::new();
        let mut rhs = Vec::new();
        let mut next: Vec<Vec<IntShare>> = Vec::with_capacity(groups.len());
        let mut leftovers = Vec::with_capacity(groups.len());
        for group in groups {
            let mut it = group.into_iter();
            let mut pairs = 0;
            let mut leftover = None;
            while let Some(a) = it.next() {
                match it.next() {
                    Some(b) => {
                        lhs.push(a);
                        rhs.push(b);
                        pairs += 1;
                    }
                    None => leftover = Some(a),
                }
            }
            next.push(Vec::with_capacity(pairs + 1));
            leftovers.push((pairs, leftover));
        }
        let mut sums = add_many(session, &lhs, &rhs).await?.into_iter();
        for (group, (pairs, leftover)) in izip!(&mut next, leftovers) {
            group.extend(sums.by_ref().take(pairs));
            group.extend(leftover);
        }
        groups = next;
    }
    Ok(groups
        .into_iter()
        .map(|g| g.into_iter().next().unwrap_or_else(|| IntShare::zero(width)))
        .collect())
}

/// `x * y mod 2^w` by schoolbook multiplication: all partial products in one
/// round, then an adder tree.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(batch = x.len()))]
pub async fn mul_many(
    session: &mut Session,
    x: &[IntShare],
    y: &[IntShare],
) -> Result<Vec<IntShare>> {
    let width = batch_width(x, y)?;
    let mut lhs = Vec::new();
    let mut rhs = Vec::new();
    for (x, y) in izip!(x, y) {
        for i in 0..width {
            for k in 0..width - i {
                lhs.push(x.bit(k));
                rhs.push(y.bit(i));
            }
        }
    }
    let mut prod = and_many(session, &lhs, &rhs).await?.into_iter();
    let groups = (0..x.len())
        .map(|_| {
            (0..width)
                .map(|i| {
                    let row: Vec<BitShare> = prod.by_ref().take(width - i).collect();
                    IntShare::from_bits(row).resize(width).shl(i)
                })
                .collect()
        })
        .collect();
    sum_many(session, groups, width).await
}

/// `x * c mod 2^w` for a public constant, by shift-and-add.
pub async fn mul_const_many(
    session: &mut Session,
    x: &[IntShare],
    c: u64,
) -> Result<Vec<IntShare>> {
    let width = x.first().map_or(0, IntShare::width);
    let groups = x
        .iter()
        .map(|v| {
            (0..width.min(64))
                .filter(|i| (c >> i) & 1 == 1)
                .map(|i| v.clone().shl(i))
                .collect()
        })
        .collect();
    sum_many(session, groups, width).await
}

/// Population count of every group of bits, in `out_width` bits.
///
/// Adder tree whose operand width grows by one bit per level, starting from
/// single bits. Fails if `out_width` cannot hold the largest count.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(groups = groups.len()))]
pub async fn popcount_many(
    session: &mut Session,
    groups: &[Vec<BitShare>],
    out_width: usize,
) -> Result<Vec<IntShare>> {
    let max_len = groups.iter().map(Vec::len).max().unwrap_or(0);
    if ceil_log2(max_len + 1) > out_width {
        return Err(Error::InvalidInput(format!(
            "a popcount of {max_len} bits does not fit {out_width} bits"
        ))
        .into());
    }
    let mut level: Vec<Vec<IntShare>> = groups
        .iter()
        .map(|g| g.iter().map(|b| IntShare::from(*b)).collect())
        .collect();
    let mut width = 1;
    while level.iter().any(|g| g.len() > 1) {
        let mut lhs = Vec::new();
        let mut rhs = Vec::new();
        let mut shape = Vec::with_capacity(level.len());
        for group in level {
            let mut it = group.into_iter();
            let mut pairs = 0;
            let mut leftover = None;
            while let Some(a) = it.next() {
                match it.next() {
                    Some(b) => {
                        lhs.push(a.resize(width));
                        rhs.push(b.resize(width));
                        pairs += 1;
                    }
                    None => leftover = Some(a),
                }
            }
            shape.push((pairs, leftover));
        }
        let mut sums = add_extend_many(session, &lhs, &rhs).await?.into_iter();
        level = shape
            .into_iter()
            .map(|(pairs, leftover)| {
                let mut next: Vec<IntShare> = sums.by_ref().take(pairs).collect();
                next.extend(leftover);
                next
            })
            .collect();
        width += 1;
    }
    Ok(level
        .into_iter()
        .map(|g| {
            g.into_iter()
                .next()
                .unwrap_or_default()
                .resize(out_width)
        })
        .collect())
}

/// Fixed-point scaling `x * numerator / 2^frac_bits`, rounded as requested.
///
/// The product is formed in `w + frac_bits` bits, which cannot overflow as
/// long as `numerator <= 2^frac_bits`, and the low `frac_bits` bits are
/// dropped, so the result has the input width `w`.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(batch = x.len()))]
pub async fn scale_and_shift_many(
    session: &mut Session,
    x: &[IntShare],
    numerator: u64,
    frac_bits: usize,
    rounding: Rounding,
) -> Result<Vec<IntShare>> {
    if frac_bits >= 64 || numerator > 1 << frac_bits {
        return Err(Error::InvalidInput(format!(
            "numerator {numerator} exceeds 2^{frac_bits}"
        ))
        .into());
    }
    let width = x.first().map_or(0, IntShare::width);
    let wide: Vec<IntShare> = x.iter().map(|v| v.clone().resize(width + frac_bits)).collect();
    let mut scaled = mul_const_many(session, &wide, numerator).await?;
    if rounding == Rounding::Ceil && frac_bits > 0 {
        let role = session.own_role();
        let bias: Vec<IntShare> = scaled
            .iter()
            .map(|v| IntShare::from_const((1 << frac_bits) - 1, v.width(), role))
            .collect();
        scaled = add_many(session, &scaled, &bias).await?;
    }
    Ok(scaled.into_iter().map(|v| v.shr(frac_bits)).collect())
}

/// AND over every group of bits, as a balanced tree. An empty group yields
/// the public constant true.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(groups = groups.len()))]
pub async fn and_reduce_many(
    session: &mut Session,
    mut groups: Vec<Vec<BitShare>>,
) -> Result<Vec<BitShare>> {
    while groups.iter().any(|g| g.len() > 1) {
        let mut lhs = Vec::new();
        let mut rhs = Vec::new();
        let mut shape = Vec::with_capacity(groups.len());
        for group in &groups {
            let pairs = group.len() / 2;
            for p in 0..pairs {
                lhs.push(group[2 * p]);
                rhs.push(group[2 * p + 1]);
            }
            shape.push((pairs, (group.len() % 2 == 1).then(|| group[group.len() - 1])));
        }
        let mut prod = and_many(session, &lhs, &rhs).await?.into_iter();
        groups = shape
            .into_iter()
            .map(|(pairs, leftover)| {
                let mut next: Vec<BitShare> = prod.by_ref().take(pairs).collect();
                next.extend(leftover);
                next
            })
            .collect();
    }
    let role = session.own_role();
    Ok(groups
        .into_iter()
        .map(|g| {
            g.into_iter()
                .next()
                .unwrap_or_else(|| BitShare::from_const(true, role))
        })
        .collect())
}

/// `x == 0` for every value: the NOR of its bits.
pub async fn is_zero_many(session: &mut Session, x: &[IntShare]) -> Result<Vec<BitShare>> {
    let role = session.own_role();
    let groups = x
        .iter()
        .map(|v| v.bits().iter().map(|b| b.not(role)).collect())
        .collect();
    and_reduce_many(session, groups).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        execution::{local::LocalRuntime, player::Role},
        protocol::binary::{input_bits, input_ints, open_bits, open_ints},
    };
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use rstest::rstest;

    const RS: Role = Role::RegistrationStation;
    const BP: Role = Role::BiometricProvider;

    /// Runs `op` on `xs` (owned by rs) and `ys` (owned by bp) of `width` bits
    /// and returns the opened results of the registration station.
    async fn run_binary_op<F, Fut>(xs: Vec<u64>, ys: Vec<u64>, width: usize, op: F) -> Vec<u64>
    where
        F: Fn(Session, Vec<IntShare>, Vec<IntShare>) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = Result<(Session, Vec<IntShare>)>> + Send + 'static,
    {
        let n = xs.len();
        let res = LocalRuntime::mock_setup()
            .await
            .unwrap()
            .run(move |mut session| {
                let (xs, ys, op) = (xs.clone(), ys.clone(), op.clone());
                async move {
                    let role = session.own_role();
                    let xv = (role == RS).then_some(xs);
                    let yv = (role == BP).then_some(ys);
                    let x = input_ints(&mut session, RS, xv.as_deref(), n, width)?;
                    let y = input_ints(&mut session, BP, yv.as_deref(), n, width)?;
                    let (mut session, out) = op(session, x, y).await?;
                    open_ints(&mut session, &out).await
                }
            })
            .await
            .unwrap();
        assert_eq!(res[0], res[1]);
        res[0].clone()
    }

    fn random_values(seed: u64, n: usize, width: usize) -> Vec<u64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut values: Vec<u64> = (0..n).map(|_| rng.gen_range(0..1u64 << width)).collect();
        values[0] = 0;
        values[1] = (1 << width) - 1;
        values
    }

    #[rstest]
    #[case(1)]
    #[case(8)]
    #[case(16)]
    #[tokio::test]
    async fn test_add_sub(#[case] width: usize) {
        let xs = random_values(1, 40, width);
        let ys = random_values(2, 40, width);
        let mask = (1u64 << width) - 1;

        let sums = run_binary_op(xs.clone(), ys.clone(), width, |mut s, x, y| async move {
            let out = add_many(&mut s, &x, &y).await?;
            Ok::<_, eyre::Report>((s, out))
        })
        .await;
        let wide = run_binary_op(xs.clone(), ys.clone(), width, |mut s, x, y| async move {
            let out = add_extend_many(&mut s, &x, &y).await?;
            Ok::<_, eyre::Report>((s, out))
        })
        .await;
        let diffs = run_binary_op(xs.clone(), ys.clone(), width, |mut s, x, y| async move {
            let out = sub_many(&mut s, &x, &y).await?;
            Ok::<_, eyre::Report>((s, out))
        })
        .await;
        for i in 0..xs.len() {
            assert_eq!(sums[i], (xs[i] + ys[i]) & mask);
            assert_eq!(wide[i], xs[i] + ys[i]);
            assert_eq!(diffs[i], xs[i].wrapping_sub(ys[i]) & mask);
        }
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    #[case(16)]
    #[tokio::test]
    async fn test_comparisons(#[case] width: usize) {
        let xs = random_values(3, 40, width);
        let mut ys = random_values(4, 40, width);
        ys[2] = xs[2];
        let lt = run_binary_op(xs.clone(), ys.clone(), width, |mut s, x, y| async move {
            let bits = lt_many(&mut s, &x, &y).await?;
            Ok::<_, eyre::Report>((s, bits.into_iter().map(IntShare::from).collect()))
        })
        .await;
        let ge = run_binary_op(xs.clone(), ys.clone(), width, |mut s, x, y| async move {
            let bits = ge_many(&mut s, &x, &y).await?;
            Ok::<_, eyre::Report>((s, bits.into_iter().map(IntShare::from).collect()))
        })
        .await;
        for i in 0..xs.len() {
            assert_eq!(lt[i] == 1, xs[i] < ys[i], "{} < {}", xs[i], ys[i]);
            assert_eq!(ge[i] == 1, xs[i] >= ys[i]);
        }
    }

    #[tokio::test]
    async fn test_mul_and_square_of_negative() {
        let width = 12;
        let xs = random_values(5, 30, width);
        let ys = random_values(6, 30, width);
        let mask = (1u64 << width) - 1;
        let prods = run_binary_op(xs.clone(), ys.clone(), width, |mut s, x, y| async move {
            let out = mul_many(&mut s, &x, &y).await?;
            Ok::<_, eyre::Report>((s, out))
        })
        .await;
        for i in 0..xs.len() {
            assert_eq!(prods[i], xs[i].wrapping_mul(ys[i]) & mask);
        }

        // a signed difference squared after sign extension
        let squares = run_binary_op(vec![3, 250], vec![250, 3], 8, |mut s, x, y| async move {
            let x: Vec<_> = x.into_iter().map(|v| v.resize(9)).collect();
            let y: Vec<_> = y.into_iter().map(|v| v.resize(9)).collect();
            let d: Vec<_> = sub_many(&mut s, &x, &y)
                .await?
                .into_iter()
                .map(|v| v.sign_extend(18))
                .collect();
            let out = mul_many(&mut s, &d, &d).await?;
            Ok::<_, eyre::Report>((s, out))
        })
        .await;
        assert_eq!(squares, vec![247 * 247, 247 * 247]);
    }

    #[rstest]
    #[case(Rounding::Floor)]
    #[case(Rounding::Ceil)]
    #[tokio::test]
    async fn test_scale_and_shift(#[case] rounding: Rounding) {
        let xs: Vec<u64> = vec![0, 1, 2, 3, 64, 100, 127, 1000, 65535];
        let n = xs.len();
        let out = run_binary_op(xs.clone(), vec![0; n], 16, move |mut s, x, _| async move {
            let out = scale_and_shift_many(&mut s, &x, 52, 7, rounding).await?;
            Ok::<_, eyre::Report>((s, out))
        })
        .await;
        for (x, got) in xs.iter().zip(out) {
            let expected = match rounding {
                Rounding::Floor => (x * 52) >> 7,
                Rounding::Ceil => (x * 52).div_ceil(128),
            };
            assert_eq!(got, expected, "x = {x}");
        }
    }

    #[tokio::test]
    async fn test_mul_const_and_sum() {
        let xs = random_values(7, 20, 10);
        let n = xs.len();
        let out = run_binary_op(xs.clone(), vec![0; n], 20, |mut s, x, _| async move {
            let out = mul_const_many(&mut s, &x, 77).await?;
            Ok::<_, eyre::Report>((s, out))
        })
        .await;
        for (x, got) in xs.iter().zip(out) {
            assert_eq!(got, x * 77);
        }

        let summed = run_binary_op(xs.clone(), xs.clone(), 16, |mut s, x, y| async move {
            let groups = vec![x.clone(), y[..3].to_vec(), vec![]];
            let out = sum_many(&mut s, groups, 16).await?;
            Ok::<_, eyre::Report>((s, out))
        })
        .await;
        assert_eq!(summed[0], xs.iter().sum::<u64>());
        assert_eq!(summed[1], xs[..3].iter().sum::<u64>());
        assert_eq!(summed[2], 0);
    }

    #[tokio::test]
    async fn test_popcount_and_zero_test() -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let groups: Vec<Vec<bool>> = [0usize, 1, 2, 7, 128, 300]
            .iter()
            .map(|len| (0..*len).map(|_| rng.gen()).collect())
            .collect();
        let lens: Vec<usize> = groups.iter().map(Vec::len).collect();
        let flat: Vec<bool> = groups.iter().flatten().copied().collect();
        let total = flat.len();

        let res = LocalRuntime::mock_setup()
            .await?
            .run(move |mut session| {
                let (flat, lens) = (flat.clone(), lens.clone());
                async move {
                    let values = (session.own_role() == BP).then_some(flat);
                    let bits = input_bits(&mut session, BP, values.as_deref(), total)?;
                    let mut offset = 0;
                    let shared: Vec<Vec<BitShare>> = lens
                        .iter()
                        .map(|l| {
                            let g = bits[offset..offset + l].to_vec();
                            offset += l;
                            g
                        })
                        .collect();
                    let counts = popcount_many(&mut session, &shared, 16).await?;
                    let zero = is_zero_many(&mut session, &counts).await?;
                    let too_narrow = popcount_many(&mut session, &shared, 8).await.is_err();
                    Ok::<_, eyre::Report>((
                        open_ints(&mut session, &counts).await?,
                        open_bits(&mut session, &zero).await?,
                        too_narrow,
                    ))
                }
            })
            .await?;
        let (counts, zero, too_narrow) = &res[0];
        for (g, (count, z)) in groups.iter().zip(counts.iter().zip(zero)) {
            let expected = g.iter().filter(|b| **b).count() as u64;
            assert_eq!(*count, expected);
            assert_eq!(*z, expected == 0);
        }
        assert!(too_narrow);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_mixed_widths() -> Result<()> {
        let res = LocalRuntime::mock_setup()
            .await?
            .run(|mut session| async move {
                let role = session.own_role();
                let x = vec![IntShare::from_const(1, 8, role)];
                let y = vec![IntShare::from_const(1, 9, role)];
                Ok::<_, eyre::Report>(add_many(&mut session, &x, &y).await.is_err())
            })
            .await?;
        assert_eq!(res, vec![true, true]);
        Ok(())
    }

    #[tokio::test]
    async fn test_lt_const_rejects_wide_constant() -> Result<()> {
        let res = LocalRuntime::mock_setup()
            .await?
            .run(|mut session| async move {
                let role = session.own_role();
                let x = vec![IntShare::from_const(100, 16, role)];
                let before = session.stats();
                let wide = lt_const_many(&mut session, &x, 65541).await;
                let untouched = session.stats() == before;
                let fits = lt_const_many(&mut session, &x, 65535).await?;
                let opened = open_bits(&mut session, &fits).await?;
                Ok::<_, eyre::Report>((wide.is_err() && untouched, opened))
            })
            .await?;
        for (rejected, fits) in res {
            assert!(rejected);
            assert_eq!(fits, vec![true]);
        }
        Ok(())
    }
}
