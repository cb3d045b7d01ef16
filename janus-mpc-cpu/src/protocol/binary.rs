//! Boolean gates over XOR-shared bits.
//!
//! XOR and NOT are local. AND consumes one Beaver triple per gate and one
//! round trip per call, however many gates the call evaluates.

use crate::{
    error::Error,
    execution::{player::Role, session::Session},
    network::value::NetworkValue,
    shares::{
        bit::{pack_shares, unpack_bits, unpack_shares},
        BitShare, IntShare,
    },
};
use eyre::Result;
use itertools::izip;
use tracing::instrument;

/// Shares `len` bits owned by `owner`. Only the owner passes `values`.
///
/// Both parties draw the same mask `r` from the shared PRF, the owner keeps
/// `v ^ r` and the peer keeps `r`, so no message is needed.
pub fn input_bits(
    session: &mut Session,
    owner: Role,
    values: Option<&[bool]>,
    len: usize,
) -> Result<Vec<BitShare>> {
    let masks = session.prf.gen_bits(len);
    if session.own_role() != owner {
        if values.is_some() {
            return Err(Error::InvalidInput(format!("only {owner} provides these values")).into());
        }
        return Ok(masks.into_iter().map(BitShare::new).collect());
    }
    let values = values
        .ok_or_else(|| Error::InvalidInput(format!("{owner} must provide its input values")))?;
    if values.len() != len {
        return Err(Error::InvalidInput(format!(
            "expected {len} input bits, got {}",
            values.len()
        ))
        .into());
    }
    Ok(izip!(values, masks)
        .map(|(v, r)| BitShare::new(v ^ r))
        .collect())
}

/// Shares `count` integers of `width` bits owned by `owner`.
pub fn input_ints(
    session: &mut Session,
    owner: Role,
    values: Option<&[u64]>,
    count: usize,
    width: usize,
) -> Result<Vec<IntShare>> {
    let bits = values.map(|values| {
        values
            .iter()
            .flat_map(|v| (0..width).map(move |i| i < 64 && (v >> i) & 1 == 1))
            .collect::<Vec<_>>()
    });
    if let Some(values) = values {
        if values.len() != count {
            return Err(Error::InvalidInput(format!(
                "expected {count} input values, got {}",
                values.len()
            ))
            .into());
        }
    }
    let shares = input_bits(session, owner, bits.as_deref(), count * width)?;
    if width == 0 {
        return Ok(vec![IntShare::zero(0); count]);
    }
    Ok(shares
        .chunks(width)
        .map(|c| IntShare::from_bits(c.to_vec()))
        .collect())
}

/// Element-wise AND of two equally long vectors in one round.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(gates = x.len()))]
pub async fn and_many(
    session: &mut Session,
    x: &[BitShare],
    y: &[BitShare],
) -> Result<Vec<BitShare>> {
    if x.len() != y.len() {
        return Err(Error::InvalidInput(format!(
            "AND operands differ in length: {} vs {}",
            x.len(),
            y.len()
        ))
        .into());
    }
    let n = x.len();
    if n == 0 {
        return Ok(vec![]);
    }
    let querier = session.own_role().is_querier();
    let triples = session.triples.next_triples(n)?;
    let x = pack_shares(x);
    let y = pack_shares(y);
    let words = x.len();

    // d = x ^ a and e = y ^ b, sent in one message
    let mut masked = Vec::with_capacity(2 * words);
    masked.extend(izip!(&x, &triples.a).map(|(x, a)| x ^ a));
    masked.extend(izip!(&y, &triples.b).map(|(y, b)| y ^ b));
    session
        .network_session
        .send(&NetworkValue::VecBit64(masked.clone()))
        .await?;
    let peer = session
        .network_session
        .receive()
        .await?
        .into_words(2 * words)?;
    session.stats_mut().record_and_batch(n);

    let z: Vec<u64> = (0..words)
        .map(|i| {
            let d = masked[i] ^ peer[i];
            let e = masked[words + i] ^ peer[words + i];
            let mut z = triples.c[i] ^ (d & triples.b[i]) ^ (e & triples.a[i]);
            if querier {
                z ^= d & e;
            }
            z
        })
        .collect();
    Ok(unpack_shares(&z, n))
}

/// Element-wise OR, computed as `x ^ y ^ (x & y)`.
pub async fn or_many(
    session: &mut Session,
    x: &[BitShare],
    y: &[BitShare],
) -> Result<Vec<BitShare>> {
    let prod = and_many(session, x, y).await?;
    Ok(izip!(x, y, prod).map(|(x, y, p)| *x ^ *y ^ p).collect())
}

pub fn not_many(session: &Session, x: &[BitShare]) -> Vec<BitShare> {
    let role = session.own_role();
    x.iter().map(|b| b.not(role)).collect()
}

/// `c ? t : f` for every triple, evaluated as `f ^ (c & (t ^ f))`.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(batch = c.len()))]
pub async fn select_many(
    session: &mut Session,
    c: &[BitShare],
    t: &[IntShare],
    f: &[IntShare],
) -> Result<Vec<IntShare>> {
    if c.len() != t.len() || c.len() != f.len() {
        return Err(Error::InvalidInput(format!(
            "select needs equally many conditions and values: {} {} {}",
            c.len(),
            t.len(),
            f.len()
        ))
        .into());
    }
    let mut conds = Vec::new();
    let mut diffs = Vec::new();
    for (c, t, f) in izip!(c, t, f) {
        if t.width() != f.width() {
            return Err(Error::WidthMismatch(t.width(), f.width()).into());
        }
        let diff = t.xor(f);
        conds.extend(std::iter::repeat(*c).take(diff.width()));
        diffs.extend(diff.into_bits());
    }
    let prod = and_many(session, &conds, &diffs).await?;
    let mut prod = prod.into_iter();
    Ok(f.iter()
        .map(|f| {
            let masked = IntShare::from_bits(prod.by_ref().take(f.width()).collect());
            f.xor(&masked)
        })
        .collect())
}

/// Reconstructs bits on both parties. Only for tests and diagnostics, the
/// protocol itself reveals through [`reveal_bits_to`].
#[instrument(level = "trace", target = "janus::network", skip_all, fields(len = x.len()))]
pub async fn open_bits(session: &mut Session, x: &[BitShare]) -> Result<Vec<bool>> {
    let words = pack_shares(x);
    session
        .network_session
        .send(&NetworkValue::VecBit64(words.clone()))
        .await?;
    let peer = session
        .network_session
        .receive()
        .await?
        .into_words(words.len())?;
    session.stats_mut().record_round();
    let opened: Vec<u64> = izip!(&words, &peer).map(|(a, b)| a ^ b).collect();
    Ok(unpack_bits(&opened, x.len()))
}

fn bits_to_u64(bits: &[bool]) -> u64 {
    bits.iter()
        .enumerate()
        .fold(0, |acc, (i, b)| acc | ((*b as u64) << i))
}

/// Reconstructs integers of at most 64 bits on both parties.
pub async fn open_ints(session: &mut Session, x: &[IntShare]) -> Result<Vec<u64>> {
    if let Some(wide) = x.iter().find(|v| v.width() > 64) {
        return Err(Error::WidthMismatch(wide.width(), 64).into());
    }
    let flat: Vec<BitShare> = x.iter().flat_map(|v| v.bits().iter().copied()).collect();
    let bits = open_bits(session, &flat).await?;
    let mut offset = 0;
    Ok(x.iter()
        .map(|v| {
            let value = bits_to_u64(&bits[offset..offset + v.width()]);
            offset += v.width();
            value
        })
        .collect())
}

/// Discloses bits to `target` only. The other party sends its shares and
/// gets `None`.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(target = %target, len = x.len()))]
pub async fn reveal_bits_to(
    session: &mut Session,
    target: Role,
    x: &[BitShare],
) -> Result<Option<Vec<bool>>> {
    let words = pack_shares(x);
    session.stats_mut().record_round();
    if session.own_role() == target {
        let peer = session
            .network_session
            .receive()
            .await?
            .into_words(words.len())?;
        let opened: Vec<u64> = izip!(&words, &peer).map(|(a, b)| a ^ b).collect();
        Ok(Some(unpack_bits(&opened, x.len())))
    } else {
        session
            .network_session
            .send(&NetworkValue::VecBit64(words))
            .await?;
        Ok(None)
    }
}

/// Discloses a single bit to `target` only.
#[instrument(level = "trace", target = "janus::network", skip_all, fields(target = %target))]
pub async fn reveal_bit_to(session: &mut Session, target: Role, x: BitShare) -> Result<Option<bool>> {
    session.stats_mut().record_round();
    if session.own_role() == target {
        let peer = session.network_session.receive().await?.into_bit()?;
        Ok(Some(x.get() ^ peer))
    } else {
        session
            .network_session
            .send(&NetworkValue::Bit(x.get()))
            .await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::local::LocalRuntime;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn owner_values<T: Clone>(session: &Session, owner: Role, values: &[T]) -> Option<Vec<T>> {
        (session.own_role() == owner).then(|| values.to_vec())
    }

    #[tokio::test]
    async fn test_and_or_not() -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let xs: Vec<bool> = (0..200).map(|_| rng.gen()).collect();
        let ys: Vec<bool> = (0..200).map(|_| rng.gen()).collect();
        let (xs_c, ys_c) = (xs.clone(), ys.clone());

        let res = LocalRuntime::mock_setup()
            .await?
            .run(move |mut session| {
                let (xs, ys) = (xs_c.clone(), ys_c.clone());
                async move {
                    let xv = owner_values(&session, Role::RegistrationStation, &xs);
                    let yv = owner_values(&session, Role::BiometricProvider, &ys);
                    let x = input_bits(&mut session, Role::RegistrationStation, xv.as_deref(), 200)?;
                    let y = input_bits(&mut session, Role::BiometricProvider, yv.as_deref(), 200)?;
                    let and = and_many(&mut session, &x, &y).await?;
                    let or = or_many(&mut session, &x, &y).await?;
                    let not = not_many(&session, &x);
                    let stats = session.stats();
                    Ok::<_, eyre::Report>((
                        open_bits(&mut session, &and).await?,
                        open_bits(&mut session, &or).await?,
                        open_bits(&mut session, &not).await?,
                        stats,
                    ))
                }
            })
            .await?;

        for (and, or, not, stats) in res {
            for i in 0..200 {
                assert_eq!(and[i], xs[i] & ys[i]);
                assert_eq!(or[i], xs[i] | ys[i]);
                assert_eq!(not[i], !xs[i]);
            }
            assert_eq!(stats.and_gates, 400);
            assert_eq!(stats.rounds, 2);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_select() -> Result<()> {
        let res = LocalRuntime::mock_setup()
            .await?
            .run(|mut session| async move {
                let role = session.own_role();
                let conds = owner_values(&session, Role::RegistrationStation, &[true, false]);
                let c = input_bits(&mut session, Role::RegistrationStation, conds.as_deref(), 2)?;
                let t = vec![IntShare::from_const(11, 8, role); 2];
                let f = vec![IntShare::from_const(200, 8, role); 2];
                let sel = select_many(&mut session, &c, &t, &f).await?;
                open_ints(&mut session, &sel).await
            })
            .await?;
        assert_eq!(res[0], vec![11, 200]);
        assert_eq!(res[1], vec![11, 200]);
        Ok(())
    }

    #[tokio::test]
    async fn test_reveal_only_to_target() -> Result<()> {
        let res = LocalRuntime::mock_setup()
            .await?
            .run(|mut session| async move {
                let values = owner_values(&session, Role::BiometricProvider, &[true, false, true]);
                let x = input_bits(&mut session, Role::BiometricProvider, values.as_deref(), 3)?;
                let bits = reveal_bits_to(&mut session, Role::RegistrationStation, &x).await?;
                let bit = reveal_bit_to(&mut session, Role::RegistrationStation, x[0]).await?;
                Ok::<_, eyre::Report>((bits, bit))
            })
            .await?;
        assert_eq!(res[0], (Some(vec![true, false, true]), Some(true)));
        assert_eq!(res[1], (None, None));
        Ok(())
    }

    #[tokio::test]
    async fn test_input_shape_is_checked() -> Result<()> {
        let res = LocalRuntime::mock_setup()
            .await?
            .run(|mut session| async move {
                let role = session.own_role();
                let values = (role == Role::RegistrationStation).then_some(vec![1u64, 2]);
                Ok::<_, eyre::Report>(input_ints(&mut session, Role::RegistrationStation, values.as_deref(), 3, 8)
                    .is_err())
            })
            .await?;
        assert_eq!(res, vec![true, false]);
        Ok(())
    }
}
