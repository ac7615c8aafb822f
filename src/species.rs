//! Species roles and the total per-species container.
//!
//! A reaction `aA + bB <=> cC + dD` always has the same four roles. Every per-species
//! quantity in the crate (coefficients, concentrations, coordinates, equations) is stored in
//! a [`MoleculeValue`], which holds exactly one value per role so lookups never fail.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// One of the four symmetric roles of a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    ReactantA,
    ReactantB,
    ProductC,
    ProductD,
}

/// Which side of the reaction arrow a species sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Reactant,
    Product,
}

impl Side {
    /// The opposite side of the arrow.
    pub fn opposite(self) -> Side {
        match self {
            Side::Reactant => Side::Product,
            Side::Product => Side::Reactant,
        }
    }
}

impl Species {
    pub const COUNT: usize = 4;

    /// All species in canonical order.
    pub const ALL: [Species; Species::COUNT] = [
        Species::ReactantA,
        Species::ReactantB,
        Species::ProductC,
        Species::ProductD,
    ];

    pub fn as_index(self) -> usize {
        self as usize
    }

    pub fn side(self) -> Side {
        match self {
            Species::ReactantA | Species::ReactantB => Side::Reactant,
            Species::ProductC | Species::ProductD => Side::Product,
        }
    }

    pub fn is_reactant(self) -> bool {
        self.side() == Side::Reactant
    }

    pub fn is_product(self) -> bool {
        self.side() == Side::Product
    }

    /// Species on the given side, in canonical order.
    pub fn on_side(side: Side) -> [Species; 2] {
        match side {
            Side::Reactant => [Species::ReactantA, Species::ReactantB],
            Side::Product => [Species::ProductC, Species::ProductD],
        }
    }

    /// Single-letter label used in tables and logs.
    pub fn symbol(self) -> &'static str {
        match self {
            Species::ReactantA => "A",
            Species::ReactantB => "B",
            Species::ProductC => "C",
            Species::ProductD => "D",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Species::ReactantA => "reactant A",
            Species::ReactantB => "reactant B",
            Species::ProductC => "product C",
            Species::ProductD => "product D",
        };
        f.write_str(name)
    }
}

/// A value for every species.
///
/// Serialized with one named field per species so configuration files stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoleculeValue<T> {
    pub reactant_a: T,
    pub reactant_b: T,
    pub product_c: T,
    pub product_d: T,
}

impl<T> MoleculeValue<T> {
    pub fn new(reactant_a: T, reactant_b: T, product_c: T, product_d: T) -> Self {
        Self {
            reactant_a,
            reactant_b,
            product_c,
            product_d,
        }
    }

    /// Builds a value by calling `f` once per species in canonical order.
    pub fn from_fn<F>(mut f: F) -> Self
    where
        F: FnMut(Species) -> T,
    {
        Self {
            reactant_a: f(Species::ReactantA),
            reactant_b: f(Species::ReactantB),
            product_c: f(Species::ProductC),
            product_d: f(Species::ProductD),
        }
    }

    /// Same value for every species.
    pub fn splat(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_fn(|_| value.clone())
    }

    pub fn get(&self, species: Species) -> &T {
        match species {
            Species::ReactantA => &self.reactant_a,
            Species::ReactantB => &self.reactant_b,
            Species::ProductC => &self.product_c,
            Species::ProductD => &self.product_d,
        }
    }

    pub fn get_mut(&mut self, species: Species) -> &mut T {
        match species {
            Species::ReactantA => &mut self.reactant_a,
            Species::ReactantB => &mut self.reactant_b,
            Species::ProductC => &mut self.product_c,
            Species::ProductD => &mut self.product_d,
        }
    }

    pub fn map<U, F>(&self, mut f: F) -> MoleculeValue<U>
    where
        F: FnMut(Species, &T) -> U,
    {
        MoleculeValue::from_fn(|species| f(species, self.get(species)))
    }

    /// Iterates `(species, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Species, &T)> + '_ {
        Species::ALL.into_iter().map(move |species| (species, self.get(species)))
    }

    /// Values for the species on one side, in canonical order.
    pub fn side(&self, side: Side) -> [&T; 2] {
        let [first, second] = Species::on_side(side);
        [self.get(first), self.get(second)]
    }
}

impl<T> Index<Species> for MoleculeValue<T> {
    type Output = T;

    fn index(&self, species: Species) -> &T {
        self.get(species)
    }
}

impl<T> IndexMut<Species> for MoleculeValue<T> {
    fn index_mut(&mut self, species: Species) -> &mut T {
        self.get_mut(species)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sides() {
        assert!(Species::ReactantA.is_reactant());
        assert!(Species::ProductD.is_product());
        assert_eq!(
            Species::on_side(Side::Product),
            [Species::ProductC, Species::ProductD]
        );
        assert_eq!(Side::Reactant.opposite(), Side::Product);
    }

    #[test]
    fn test_from_fn_and_index() {
        let value = MoleculeValue::from_fn(|species| species.as_index() * 10);
        assert_eq!(value[Species::ReactantA], 0);
        assert_eq!(value[Species::ProductD], 30);

        let mut value = value;
        value[Species::ProductC] = 7;
        assert_eq!(value.product_c, 7);
    }

    #[test]
    fn test_map_and_iter_order() {
        let value = MoleculeValue::new(1, 2, 3, 4);
        let doubled = value.map(|_, v| v * 2);
        assert_eq!(doubled, MoleculeValue::new(2, 4, 6, 8));

        let order: Vec<Species> = value.iter().map(|(species, _)| species).collect();
        assert_eq!(order, Species::ALL.to_vec());
        assert_eq!(value.side(Side::Reactant), [&1, &2]);
    }

    #[test]
    fn test_serde_field_names() {
        let value = MoleculeValue::new(1, 2, 3, 4);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(
            json,
            r#"{"reactant_a":1,"reactant_b":2,"product_c":3,"product_d":4}"#
        );
        let parsed: MoleculeValue<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, value);
    }
}
