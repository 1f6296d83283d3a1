//! # Built-in Generators
//!
//! Constructors for the field specs used in trait definitions. Every
//! constructor returns a [`Field`]; stateful ones wrap a [`Generator`]
//! whose state persists across calls for the lifetime of the registry.
//! Closures handed to [`func`] and friends must be `Clone`: every registry
//! the definition is added to runs its own copy.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use fake::{Dummy, Fake};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use crate::error::{defect, DefinitionError};
use crate::factory::traits::Trait;
use crate::generate::field::{depends_on, Field, Forks, Generator, RelationRequest};
use crate::generate::value::Value;

pub(crate) const LOREM_IPSUM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat. Duis aute irure dolor in reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur. Excepteur sint occaecat cupidatat non proident, sunt in culpa qui officia deserunt mollit anim id est laborum.";

/// Wrap a closure as a generator. The closure runs once per row.
pub fn func<F, V>(mut f: F) -> Field
where
    F: FnMut() -> V + Clone + Send + 'static,
    V: Into<Field>,
{
    Field::generator(move || -> Field { f().into() })
}

/// `start`, `start + 1`, ...
pub fn sequence_int(start: i64) -> Field {
    let mut cur = start - 1;
    Field::generator(move || -> Field {
        cur += 1;
        Field::Value(Value::Int(cur))
    })
}

/// Render `template` with `{}` replaced by a counter starting at `start`.
///
/// `sequence_string("Agent Smith {}", 1)` yields `"Agent Smith 1"`, `"Agent Smith 2"`, ...
pub fn sequence_string(template: &str, start: i64) -> Field {
    let template = template.to_string();
    let mut cur = start - 1;
    Field::generator(move || -> Field {
        cur += 1;
        Field::Value(Value::String(Cow::Owned(
            template.replace("{}", &cur.to_string()),
        )))
    })
}

/// Call `f` with a counter starting at `start`.
pub fn sequence_fn<F, V>(f: F, start: i64) -> Field
where
    F: Fn(i64) -> V + Clone + Send + 'static,
    V: Into<Field>,
{
    let mut cur = start - 1;
    Field::generator(move || -> Field {
        cur += 1;
        f(cur).into()
    })
}

/// Feed each result of `f` back into the next call, starting from `init`.
pub fn chain_int<F>(init: i64, mut f: F) -> Field
where
    F: FnMut(i64) -> i64 + Clone + Send + 'static,
{
    let mut prev = init;
    Field::generator(move || -> Field {
        prev = f(prev);
        Field::Value(Value::Int(prev))
    })
}

/// Pick a random element on each call, from an OS-seeded RNG.
pub fn pick_random<I, V>(values: I) -> Field
where
    I: IntoIterator<Item = V>,
    V: Into<Field>,
{
    pick_with_rng(collect_choices("pick_random", values), StdRng::from_os_rng())
}

/// Pick a random element on each call, reproducibly for a given `seed`.
pub fn pick_random_seeded<I, V>(values: I, seed: u64) -> Field
where
    I: IntoIterator<Item = V>,
    V: Into<Field>,
{
    pick_with_rng(
        collect_choices("pick_random", values),
        StdRng::seed_from_u64(seed),
    )
}

fn pick_with_rng(choices: Vec<Field>, rng: StdRng) -> Field {
    Field::generator(Pick { choices, rng })
}

struct Pick {
    choices: Vec<Field>,
    rng: StdRng,
}

impl Generator for Pick {
    fn next(&mut self) -> Field {
        let idx = self.rng.random_range(0..self.choices.len());
        self.choices[idx].clone()
    }

    fn fork(&self, forks: &mut Forks) -> Box<dyn Generator> {
        Box::new(Pick {
            choices: self.choices.iter().map(|c| forks.field(c)).collect(),
            rng: self.rng.clone(),
        })
    }
}

/// Yield the elements in order, starting over after the last one.
pub fn cycle<I, V>(values: I) -> Field
where
    I: IntoIterator<Item = V>,
    V: Into<Field>,
{
    repeat_each(values, 1)
}

/// Yield every element `k` times, cycling back to the start after the last
/// one: `[1, 2, 3]` with `k = 2` gives `1, 1, 2, 2, 3, 3, 1, 1, ...`.
pub fn repeat_each<I, V>(values: I, k: usize) -> Field
where
    I: IntoIterator<Item = V>,
    V: Into<Field>,
{
    let choices = collect_choices("repeat_each", values);
    if k == 0 {
        defect(DefinitionError::InvalidDefinition {
            message: "repeat_each needs a repeat count of at least 1".to_string(),
        });
    }
    Field::generator(RepeatEach { choices, k, pos: 0 })
}

struct RepeatEach {
    choices: Vec<Field>,
    k: usize,
    pos: usize,
}

impl Generator for RepeatEach {
    fn next(&mut self) -> Field {
        let field = self.choices[(self.pos / self.k) % self.choices.len()].clone();
        self.pos = (self.pos + 1) % (self.choices.len() * self.k);
        field
    }

    fn fork(&self, forks: &mut Forks) -> Box<dyn Generator> {
        Box::new(RepeatEach {
            choices: self.choices.iter().map(|c| forks.field(c)).collect(),
            k: self.k,
            pos: self.pos,
        })
    }
}

fn collect_choices<I, V>(name: &str, values: I) -> Vec<Field>
where
    I: IntoIterator<Item = V>,
    V: Into<Field>,
{
    let choices: Vec<Field> = values.into_iter().map(Into::into).collect();
    if choices.is_empty() {
        defect(DefinitionError::InvalidDefinition {
            message: format!("{} needs at least one value", name),
        });
    }
    choices
}

/// Field assigned by the driver on insert (ids, timestamps with defaults, ...).
pub fn auto() -> Field {
    Field::Auto
}

/// Fixed placeholder text, cut to `limit` bytes. `0` means the whole text.
pub fn dummy_text(limit: usize) -> Field {
    if limit > LOREM_IPSUM.len() {
        defect(DefinitionError::InvalidDefinition {
            message: format!(
                "The maximum length of dummy_text is {}, got {}",
                LOREM_IPSUM.len(),
                limit
            ),
        });
    }
    let text = if limit == 0 {
        LOREM_IPSUM
    } else {
        &LOREM_IPSUM[..limit]
    };
    Field::Value(Value::String(Cow::Borrowed(text)))
}

/// Text from any `fake` faker, e.g. `fake(Name())`.
pub fn fake<F>(faker: F) -> Field
where
    F: Send + Sync + 'static,
    String: Dummy<F>,
{
    fake_with(faker, StdRng::from_os_rng())
}

/// Like [`fake`], reproducible for a given `seed`.
pub fn fake_seeded<F>(faker: F, seed: u64) -> Field
where
    F: Send + Sync + 'static,
    String: Dummy<F>,
{
    fake_with(faker, StdRng::seed_from_u64(seed))
}

fn fake_with<F>(faker: F, mut rng: StdRng) -> Field
where
    F: Send + Sync + 'static,
    String: Dummy<F>,
{
    let faker = Arc::new(faker);
    Field::generator(move || -> Field {
        let text: String = Fake::fake_with_rng(&*faker, &mut rng);
        Field::Value(Value::String(Cow::Owned(text)))
    })
}

/// A dependent field rendering `template`; every `{name}` placeholder is a
/// dependency.
pub fn template(template: &str) -> Field {
    depends_on(placeholders(template)).template(template)
}

/// `{name}` placeholders; the name is capture group 1.
pub(crate) fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("valid regex"))
}

/// Placeholder names of a `{name}` template, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in placeholder_regex().captures_iter(template) {
        let name = cap[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// One related record from public trait `trait_name`.
pub fn related(trait_name: &str) -> Field {
    related_request(trait_name, 1, None)
}

/// `count` related records per row.
pub fn related_batch(trait_name: &str, count: usize) -> Field {
    related_request(trait_name, count, None)
}

/// One related record with `overrides` applied on top of the trait.
pub fn related_custom(trait_name: &str, overrides: Trait) -> Field {
    related_request(trait_name, 1, Some(overrides))
}

/// `count` related records per row with `overrides` applied.
pub fn related_custom_batch(trait_name: &str, count: usize, overrides: Trait) -> Field {
    related_request(trait_name, count, Some(overrides))
}

fn related_request(trait_name: &str, count: usize, overrides: Option<Trait>) -> Field {
    Field::Relation(RelationRequest {
        trait_name: trait_name.to_string(),
        count,
        overrides,
    })
}
