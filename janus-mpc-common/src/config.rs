use crate::{
    bit_length, ceil_log2,
    error::Error,
    DEFAULT_FRACTION_NUMERATOR, EUCLIDEAN_DISTANCE_BITS, FINGER_BITS_PER_SLOT,
    FIXED_POINT_FRAC_BITS, HAMMING_DISTANCE_BITS, MAX_BITS_PER_SLOT, PRIME_MOD, SCORE_BITS,
    SCORE_THRESHOLD_FINGER, SCORE_THRESHOLD_IRIS, SIMILARITY_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The biometric modality of the enrolled database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BioKind {
    /// Multi-bit finger codes compared by Euclidean distance.
    Finger,
    /// 1-bit iris codes with quality masks.
    Iris,
}

impl BioKind {
    pub fn default_metric(&self) -> DistanceMetric {
        match self {
            BioKind::Finger => DistanceMetric::Euclidean,
            BioKind::Iris => DistanceMetric::MaskedHamming,
        }
    }

    /// Default threshold of the threshold-only path.
    pub fn default_score_threshold(&self) -> u64 {
        match self {
            BioKind::Finger => SCORE_THRESHOLD_FINGER,
            BioKind::Iris => SCORE_THRESHOLD_IRIS,
        }
    }
}

impl FromStr for BioKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "finger" => Ok(BioKind::Finger),
            "iris" => Ok(BioKind::Iris),
            other => Err(Error::UnknownBioKind(other.to_owned())),
        }
    }
}

impl fmt::Display for BioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BioKind::Finger => write!(f, "finger"),
            BioKind::Iris => write!(f, "iris"),
        }
    }
}

/// Distance strategy evaluated over the shared templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Hamming,
    MaskedHamming,
    Euclidean,
}

impl DistanceMetric {
    pub fn uses_mask(&self) -> bool {
        matches!(self, DistanceMetric::MaskedHamming)
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hamming" => Ok(DistanceMetric::Hamming),
            "masked-hamming" | "masked_hamming" => Ok(DistanceMetric::MaskedHamming),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            other => Err(Error::InvalidSetting(format!("unknown metric {other}"))),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Hamming => write!(f, "hamming"),
            DistanceMetric::MaskedHamming => write!(f, "masked-hamming"),
            DistanceMetric::Euclidean => write!(f, "euclidean"),
        }
    }
}

/// How a reconstructed score is classified in the threshold-only path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdTest {
    /// Full oblivious comparison `score < threshold`.
    LessThan(u64),
    /// `score < 2^(SCORE_BITS - top_bits)`, evaluated as "the `top_bits` most
    /// significant bits are all zero".
    HighBitsZero { top_bits: usize },
}

impl ThresholdTest {
    /// Plaintext reference of the classification.
    pub fn matches(&self, score: u64) -> bool {
        match self {
            ThresholdTest::LessThan(t) => score < *t,
            ThresholdTest::HighBitsZero { top_bits } => {
                score >> (SCORE_BITS - top_bits) == 0
            }
        }
    }
}

/// Public parameters of one membership run, agreed by both parties.
///
/// Templates of one identity are stored contiguously: the `fuse` templates of
/// identity `i` live at `[i * fuse, i * fuse + fuse)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BioSettingRepr")]
pub struct BioSetting {
    kind: BioKind,
    metric: DistanceMetric,
    user_num: usize,
    fuse: usize,
    template_size: usize,
    db_size: usize,
    threshold: u64,
    prime_mod: u64,
    bits_per_slot: u8,
    fraction_numerator: u64,
}

impl BioSetting {
    /// Creates a setting with the default metric of `kind`.
    ///
    /// Iris templates always use 1-bit slots, the `bits_per_slot` argument only
    /// applies to finger templates.
    pub fn new(
        kind: BioKind,
        user_num: usize,
        fuse: usize,
        template_size: usize,
        threshold: u64,
        prime_mod: u64,
        bits_per_slot: u8,
    ) -> Result<Self, Error> {
        let bits_per_slot = match kind {
            BioKind::Finger => bits_per_slot,
            BioKind::Iris => 1,
        };
        let setting = Self {
            kind,
            metric: kind.default_metric(),
            user_num,
            fuse,
            template_size,
            db_size: user_num.saturating_mul(fuse),
            threshold,
            prime_mod,
            bits_per_slot,
            fraction_numerator: DEFAULT_FRACTION_NUMERATOR,
        };
        setting.validate()?;
        Ok(setting)
    }

    /// Shorthand with the default threshold, prime and slot width of `kind`.
    pub fn with_defaults(
        kind: BioKind,
        user_num: usize,
        fuse: usize,
        template_size: usize,
    ) -> Result<Self, Error> {
        Self::new(
            kind,
            user_num,
            fuse,
            template_size,
            SIMILARITY_THRESHOLD,
            PRIME_MOD,
            FINGER_BITS_PER_SLOT,
        )
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Result<Self, Error> {
        self.metric = metric;
        self.validate()?;
        Ok(self)
    }

    pub fn with_threshold(mut self, threshold: u64) -> Result<Self, Error> {
        self.threshold = threshold;
        self.validate()?;
        Ok(self)
    }

    pub fn with_fraction_numerator(mut self, numerator: u64) -> Result<Self, Error> {
        self.fraction_numerator = numerator;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.user_num == 0 || self.fuse == 0 {
            return Err(Error::InvalidSetting(format!(
                "need at least one identity and one template per identity, got N={} fuse={}",
                self.user_num, self.fuse
            )));
        }
        if self.user_num.checked_mul(self.fuse) != Some(self.db_size) {
            return Err(Error::InvalidSetting(format!(
                "database size {} is not N={} times fuse={}",
                self.db_size, self.user_num, self.fuse
            )));
        }
        let max_bits = match self.kind {
            BioKind::Finger => MAX_BITS_PER_SLOT,
            BioKind::Iris => 1,
        };
        if self.bits_per_slot == 0 || self.bits_per_slot > max_bits {
            return Err(Error::UnsupportedSlotWidth(self.bits_per_slot));
        }
        if self.prime_mod < 2 || bit_length(self.prime_mod) >= SCORE_BITS {
            return Err(Error::InvalidSetting(format!(
                "prime modulus {} does not leave room for the share sum in {SCORE_BITS} bits",
                self.prime_mod
            )));
        }
        if self.template_size == 0 {
            return Err("template size must be positive".into());
        }
        match self.metric {
            DistanceMetric::Hamming | DistanceMetric::MaskedHamming => {
                if self.bits_per_slot != 1 {
                    return Err(Error::InvalidSetting(format!(
                        "{} needs 1-bit slots, got {}",
                        self.metric, self.bits_per_slot
                    )));
                }
                if ceil_log2(self.template_size + 1) > HAMMING_DISTANCE_BITS {
                    return Err(Error::InvalidSetting(format!(
                        "template size {} overflows a {HAMMING_DISTANCE_BITS}-bit popcount",
                        self.template_size
                    )));
                }
            }
            DistanceMetric::Euclidean => {}
        }
        if self.metric == DistanceMetric::Hamming
            && bit_length(self.threshold) > HAMMING_DISTANCE_BITS
        {
            return Err(Error::InvalidSetting(format!(
                "threshold {} does not fit {HAMMING_DISTANCE_BITS} bits",
                self.threshold
            )));
        }
        if self.metric == DistanceMetric::MaskedHamming
            && (self.fraction_numerator == 0
                || self.fraction_numerator > 1 << FIXED_POINT_FRAC_BITS)
        {
            return Err(Error::InvalidSetting(format!(
                "fraction numerator {} outside of (0, {}]",
                self.fraction_numerator,
                1 << FIXED_POINT_FRAC_BITS
            )));
        }
        Ok(())
    }

    pub fn kind(&self) -> BioKind {
        self.kind
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn user_num(&self) -> usize {
        self.user_num
    }

    pub fn fuse(&self) -> usize {
        self.fuse
    }

    pub fn template_size(&self) -> usize {
        self.template_size
    }

    pub fn db_size(&self) -> usize {
        self.db_size
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn prime_mod(&self) -> u64 {
        self.prime_mod
    }

    pub fn bits_per_slot(&self) -> u8 {
        self.bits_per_slot
    }

    pub fn fraction_numerator(&self) -> u64 {
        self.fraction_numerator
    }

    /// Accumulator width of the Euclidean distance, wide enough for
    /// `template_size` squared slot differences and for the threshold itself.
    pub fn euclidean_distance_bits(&self) -> usize {
        let k = self.bits_per_slot as usize;
        EUCLIDEAN_DISTANCE_BITS
            .max(2 * k + ceil_log2(self.template_size))
            .max(bit_length(self.threshold))
    }

    /// Classification used by the threshold-only path.
    pub fn score_threshold_test(&self) -> Result<ThresholdTest, Error> {
        if bit_length(self.threshold) > SCORE_BITS {
            return Err(Error::InvalidSetting(format!(
                "score threshold {} does not fit {SCORE_BITS} bits",
                self.threshold
            )));
        }
        match self.kind {
            BioKind::Finger => Ok(ThresholdTest::LessThan(self.threshold)),
            BioKind::Iris => {
                if !self.threshold.is_power_of_two() {
                    return Err(Error::InvalidSetting(format!(
                        "iris score threshold {} is not a power of two",
                        self.threshold
                    )));
                }
                let top_bits = SCORE_BITS - self.threshold.trailing_zeros() as usize;
                Ok(ThresholdTest::HighBitsZero { top_bits })
            }
        }
    }
}

impl fmt::Display for BioSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "setting(bio-type: {}, metric: {}, TS: {}, N: {}, fuse: {})",
            self.kind, self.metric, self.template_size, self.user_num, self.fuse
        )
    }
}

/// Wire form of [`BioSetting`]. Deserialized settings go through the same
/// checks as constructed ones.
#[derive(Deserialize)]
struct BioSettingRepr {
    kind: BioKind,
    metric: DistanceMetric,
    user_num: usize,
    fuse: usize,
    template_size: usize,
    #[serde(default)]
    db_size: Option<usize>,
    threshold: u64,
    prime_mod: u64,
    bits_per_slot: u8,
    #[serde(default = "default_fraction_numerator")]
    fraction_numerator: u64,
}

impl TryFrom<BioSettingRepr> for BioSetting {
    type Error = Error;

    fn try_from(repr: BioSettingRepr) -> Result<Self, Error> {
        let setting = Self {
            kind: repr.kind,
            metric: repr.metric,
            user_num: repr.user_num,
            fuse: repr.fuse,
            template_size: repr.template_size,
            db_size: repr
                .db_size
                .unwrap_or_else(|| repr.user_num.saturating_mul(repr.fuse)),
            threshold: repr.threshold,
            prime_mod: repr.prime_mod,
            bits_per_slot: repr.bits_per_slot,
            fraction_numerator: repr.fraction_numerator,
        };
        setting.validate()?;
        Ok(setting)
    }
}

/// Process configuration, loaded from `<PREFIX>__<FIELD>` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bio_type")]
    pub bio_type: String,

    #[serde(default = "default_user_num")]
    pub user_num: usize,

    #[serde(default = "default_fuse")]
    pub fuse: usize,

    #[serde(default = "default_template_size")]
    pub template_size: usize,

    #[serde(default)]
    pub metric: Option<String>,

    #[serde(default)]
    pub threshold: Option<u64>,

    #[serde(default = "default_prime_mod")]
    pub prime_mod: u64,

    #[serde(default = "default_bits_per_slot")]
    pub bits_per_slot: u8,

    #[serde(default = "default_fraction_numerator")]
    pub fraction_numerator: u64,

    #[serde(default = "default_peer_host")]
    pub peer_host: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seed of the simulated triple dealer, must agree between both parties.
    #[serde(default)]
    pub dealer_seed: u64,

    /// Seed of the synthetic database, must agree between both parties.
    #[serde(default = "default_data_seed")]
    pub data_seed: u64,
}

fn default_bio_type() -> String {
    "finger".to_string()
}

fn default_user_num() -> usize {
    32
}

fn default_fuse() -> usize {
    1
}

fn default_template_size() -> usize {
    128
}

fn default_prime_mod() -> u64 {
    PRIME_MOD
}

fn default_bits_per_slot() -> u8 {
    FINGER_BITS_PER_SLOT
}

fn default_fraction_numerator() -> u64 {
    DEFAULT_FRACTION_NUMERATOR
}

fn default_peer_host() -> String {
    "127.0.0.1".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_data_seed() -> u64 {
    142
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bio_type: default_bio_type(),
            user_num: default_user_num(),
            fuse: default_fuse(),
            template_size: default_template_size(),
            metric: None,
            threshold: None,
            prime_mod: default_prime_mod(),
            bits_per_slot: default_bits_per_slot(),
            fraction_numerator: default_fraction_numerator(),
            peer_host: default_peer_host(),
            connect_timeout_secs: default_connect_timeout_secs(),
            dealer_seed: 0,
            data_seed: default_data_seed(),
        }
    }
}

impl Config {
    pub fn load_config(prefix: &str) -> Result<Config, Error> {
        let settings = config::Config::builder();
        let settings = settings
            .add_source(
                config::Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize::<Config>()?;
        Ok(config)
    }

    pub fn bio_kind(&self) -> Result<BioKind, Error> {
        self.bio_type.parse()
    }

    /// Setting of the full membership protocol.
    pub fn bio_setting(&self) -> Result<BioSetting, Error> {
        let kind = self.bio_kind()?;
        let setting = BioSetting::new(
            kind,
            self.user_num,
            self.fuse,
            self.template_size,
            self.threshold.unwrap_or(SIMILARITY_THRESHOLD),
            self.prime_mod,
            self.bits_per_slot,
        )?;
        let setting = match &self.metric {
            Some(metric) => setting.with_metric(metric.parse()?)?,
            None => setting,
        };
        if setting.metric() == DistanceMetric::MaskedHamming && self.threshold.is_some() {
            return Err(Error::InvalidSetting(
                "masked-hamming takes a fraction numerator, not a distance threshold".to_string(),
            ));
        }
        setting.with_fraction_numerator(self.fraction_numerator)
    }

    /// Setting of the threshold-only path, the template size plays no role there.
    pub fn score_setting(&self) -> Result<BioSetting, Error> {
        let kind = self.bio_kind()?;
        let setting = BioSetting::new(
            kind,
            self.user_num,
            self.fuse,
            self.template_size.max(1),
            self.threshold.unwrap_or(kind.default_score_threshold()),
            self.prime_mod,
            self.bits_per_slot,
        )?;
        setting.score_threshold_test()?;
        Ok(setting)
    }
}
