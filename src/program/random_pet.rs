//! Random Pet Resource
//!
//! The single resource type used by the test stack. A random pet is a
//! generated, human-readable name such as `brave-otter` that becomes
//! the resource id.
//!
//! Id shape by length:
//! - 1: `name`
//! - 2: `adjective-name`
//! - n: `adverb-...-adverb-adjective-name` (n - 2 adverbs)

use std::collections::HashSet;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

/// Resource type token used in URNs.
pub const RANDOM_PET_TYPE: &str = "random:index/randomPet:RandomPet";

const DEFAULT_LENGTH: u32 = 2;

/// Longest pet name, in words, a provider will generate.
pub const MAX_LENGTH: u32 = 64;
const DEFAULT_SEPARATOR: &str = "-";

const ADVERBS: &[&str] = &[
    "actually", "amazingly", "briefly", "calmly", "closely", "deeply", "eagerly", "fairly",
    "gently", "happily", "highly", "jointly", "kindly", "largely", "loudly", "mainly",
    "neatly", "openly", "partly", "quickly", "rarely", "really", "safely", "slowly",
    "surely", "truly", "vastly", "wholly",
];

const ADJECTIVES: &[&str] = &[
    "able", "bold", "brave", "bright", "calm", "clever", "cool", "eager", "fair", "fast",
    "fine", "fond", "glad", "grand", "happy", "humble", "keen", "kind", "lively", "lucky",
    "merry", "noble", "proud", "quiet", "rapid", "smart", "sunny", "tidy", "vast", "witty",
];

const NAMES: &[&str] = &[
    "alpaca", "badger", "beagle", "bison", "cat", "cobra", "crane", "dingo", "dove", "eagle",
    "ferret", "finch", "gecko", "goat", "hare", "heron", "ibex", "koala", "lemur", "lynx",
    "marmot", "mole", "newt", "otter", "owl", "panda", "quail", "raven", "seal", "tapir",
    "toad", "walrus", "wombat", "yak", "zebra",
];

/// Errors raised by a resource provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Random pet '{name}': length must be between 1 and {}, got {length}", MAX_LENGTH)]
    InvalidLength { name: String, length: u32 },

    #[error("Duplicate resource URN '{0}'; resource names must be unique within a stack")]
    DuplicateResource(String),

    #[error("Provider failed to create '{name}': {message}")]
    Failed { name: String, message: String },
}

/// Inputs for a random pet resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RandomPetArgs {
    /// Number of words in the generated name (default 2)
    pub length: Option<u32>,
    /// Optional leading word
    pub prefix: Option<String>,
    /// Word separator (default `-`)
    pub separator: Option<String>,
}

impl RandomPetArgs {
    /// Sets the word count.
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the leading word.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    fn length(&self) -> u32 {
        self.length.unwrap_or(DEFAULT_LENGTH)
    }

    fn separator(&self) -> &str {
        self.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR)
    }
}

/// A created random pet resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomPet {
    /// Logical resource name
    pub name: String,
    /// Unique resource name within the engine
    pub urn: String,
    /// Generated pet name
    pub id: String,
}

/// Anything that can provision the test stack's resources.
pub trait ResourceProvider {
    fn create_random_pet(
        &mut self,
        name: &str,
        args: &RandomPetArgs,
    ) -> Result<RandomPet, ProviderError>;
}

/// Provider that generates pet names in-process.
pub struct LocalProvider {
    project: String,
    stack: String,
    rng: StdRng,
    urns: HashSet<String>,
}

impl LocalProvider {
    /// Creates a provider seeded from system entropy.
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self::with_rng(project, stack, StdRng::from_entropy())
    }

    /// Creates a provider whose output is reproducible for a given seed.
    pub fn with_seed(project: impl Into<String>, stack: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(project, stack, StdRng::seed_from_u64(seed))
    }

    fn with_rng(project: impl Into<String>, stack: impl Into<String>, rng: StdRng) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            rng,
            urns: HashSet::new(),
        }
    }

    /// Builds the URN of a random pet resource in this stack.
    pub fn urn(&self, name: &str) -> String {
        format!(
            "urn:pulumi:{}::{}::{}::{}",
            self.stack, self.project, RANDOM_PET_TYPE, name
        )
    }

    fn pick(&mut self, words: &[&'static str]) -> &'static str {
        words.choose(&mut self.rng).copied().unwrap_or("pet")
    }

    fn generate(&mut self, args: &RandomPetArgs) -> String {
        let length = args.length();
        let mut words: Vec<String> = Vec::new();

        if let Some(prefix) = args.prefix.as_deref().filter(|p| !p.is_empty()) {
            words.push(prefix.to_string());
        }

        for _ in 2..length {
            words.push(self.pick(ADVERBS).to_string());
        }
        if length >= 2 {
            words.push(self.pick(ADJECTIVES).to_string());
        }
        words.push(self.pick(NAMES).to_string());

        words.join(args.separator())
    }
}

impl ResourceProvider for LocalProvider {
    fn create_random_pet(
        &mut self,
        name: &str,
        args: &RandomPetArgs,
    ) -> Result<RandomPet, ProviderError> {
        let length = args.length();
        if length == 0 || length > MAX_LENGTH {
            return Err(ProviderError::InvalidLength {
                name: name.to_string(),
                length,
            });
        }

        let urn = self.urn(name);
        if !self.urns.insert(urn.clone()) {
            return Err(ProviderError::DuplicateResource(urn));
        }

        let id = self.generate(args);
        debug!("Created {} with id {}", urn, id);

        Ok(RandomPet {
            name: name.to_string(),
            urn,
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LocalProvider {
        LocalProvider::with_seed("proj", "dev", 7)
    }

    #[test]
    fn test_default_length_two_words() {
        let pet = provider()
            .create_random_pet("pet", &RandomPetArgs::default())
            .unwrap();
        let parts: Vec<&str> = pet.id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(NAMES.contains(&parts[1]));
    }

    #[test]
    fn test_length_one_is_name_only() {
        let args = RandomPetArgs::default().with_length(1);
        let pet = provider().create_random_pet("pet", &args).unwrap();
        assert!(NAMES.contains(&pet.id.as_str()));
    }

    #[test]
    fn test_length_three_has_adverb() {
        let args = RandomPetArgs::default().with_length(3);
        let pet = provider().create_random_pet("pet", &args).unwrap();
        let parts: Vec<&str> = pet.id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert!(ADVERBS.contains(&parts[0]));
        assert!(ADJECTIVES.contains(&parts[1]));
        assert!(NAMES.contains(&parts[2]));
    }

    #[test]
    fn test_prefix_and_separator() {
        let args = RandomPetArgs::default()
            .with_prefix("ci")
            .with_separator("_");
        let pet = provider().create_random_pet("pet", &args).unwrap();
        assert!(pet.id.starts_with("ci_"));
        assert_eq!(pet.id.split('_').count(), 3);
    }

    #[test]
    fn test_zero_length_rejected() {
        let args = RandomPetArgs::default().with_length(0);
        let err = provider().create_random_pet("pet", &args).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidLength { length: 0, .. }));
    }

    #[test]
    fn test_length_upper_bound() {
        let args = RandomPetArgs::default().with_length(MAX_LENGTH);
        let pet = provider().create_random_pet("pet", &args).unwrap();
        assert_eq!(pet.id.split('-').count(), MAX_LENGTH as usize);

        for length in [MAX_LENGTH + 1, u32::MAX] {
            let args = RandomPetArgs::default().with_length(length);
            let err = provider().create_random_pet("pet", &args).unwrap_err();
            assert!(matches!(err, ProviderError::InvalidLength { length: l, .. } if l == length));
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut provider = provider();
        provider
            .create_random_pet("pet", &RandomPetArgs::default())
            .unwrap();
        let err = provider
            .create_random_pet("pet", &RandomPetArgs::default())
            .unwrap_err();
        assert!(matches!(err, ProviderError::DuplicateResource(_)));
    }

    #[test]
    fn test_urn_format() {
        let pet = provider()
            .create_random_pet("my-pet", &RandomPetArgs::default())
            .unwrap();
        assert_eq!(
            pet.urn,
            "urn:pulumi:dev::proj::random:index/randomPet:RandomPet::my-pet"
        );
        assert_eq!(pet.name, "my-pet");
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = LocalProvider::with_seed("p", "s", 42)
            .create_random_pet("x", &RandomPetArgs::default())
            .unwrap();
        let b = LocalProvider::with_seed("p", "s", 42)
            .create_random_pet("x", &RandomPetArgs::default())
            .unwrap();
        assert_eq!(a.id, b.id);
    }
}
