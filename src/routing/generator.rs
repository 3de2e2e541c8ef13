//! Candidate route enumeration
//!
//! Builds an adjacency index over the catalog snapshot keyed by
//! (chain, token_in), then enumerates 2-leg and 3-leg chains lazily. The
//! caller caps how many candidates it takes per cycle, so enumeration cost
//! is bounded by consumption, not by catalog size.
//!
//! 2-leg routes only require chaining plus `token_in != token_out` at the
//! ends; they are not forced to close back to the input token, so they cover
//! cross-token rebalances as well as A->B->A cycles. 3-leg routes must close
//! the triangle.

use crate::types::{Leg, Route};
use alloy::primitives::Address;
use std::collections::HashMap;

pub struct RouteGenerator<'a> {
    legs: Vec<&'a Leg>,
    by_token_in: HashMap<(&'a str, Address), Vec<&'a Leg>>,
}

impl<'a> RouteGenerator<'a> {
    pub fn new(legs: impl IntoIterator<Item = &'a Leg>) -> Self {
        let legs: Vec<&'a Leg> = legs.into_iter().collect();
        let mut by_token_in: HashMap<(&'a str, Address), Vec<&'a Leg>> = HashMap::new();
        for leg in &legs {
            by_token_in
                .entry((leg.chain.as_str(), leg.token_in))
                .or_default()
                .push(leg);
        }
        Self { legs, by_token_in }
    }

    fn successors(&'a self, leg: &'a Leg) -> impl Iterator<Item = &'a &'a Leg> + 'a {
        self.by_token_in
            .get(&(leg.chain.as_str(), leg.token_out))
            .into_iter()
            .flatten()
    }

    /// Lazy stream of candidate routes, 2-leg first.
    pub fn routes(&'a self, max_hops: usize) -> impl Iterator<Item = Route> + 'a {
        let two = self
            .legs
            .iter()
            .filter(move |_| max_hops >= 2)
            .flat_map(move |a| {
                self.successors(a)
                    .filter(|b| a.token_in != b.token_out)
                    .filter_map(|b| Route::new(vec![(*a).clone(), (*b).clone()]))
            });

        let three = self
            .legs
            .iter()
            .filter(move |_| max_hops >= 3)
            .flat_map(move |a| {
                self.successors(a).flat_map(move |b| {
                    self.successors(b)
                        .filter(|c| c.token_out == a.token_in)
                        .filter_map(|c| {
                            Route::new(vec![(*a).clone(), (*b).clone(), (*c).clone()])
                        })
                })
            });

        two.chain(three)
    }
}
