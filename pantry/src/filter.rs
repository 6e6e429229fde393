//! Free-text filtering over an already fetched set of recipes.
//!
//! This is a plain case-insensitive substring match, rescanning the whole set on every call.
//! Result sets are expected to be small, since the listing is not paginated.
use crate::basic_models::Recipe;

/// Whether a recipe matches a free-text query.
///
/// A blank query matches everything. Otherwise the lowercased query must appear somewhere in
/// the title, the description, any single ingredient, or the category name.
pub fn matches(recipe: &Recipe, query: &str) -> bool {
    if query.trim().is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);
    contains(&recipe.title)
        || recipe.description.as_deref().is_some_and(|d| contains(d))
        || recipe.ingredients.iter().any(|ingredient| contains(ingredient))
        || contains(<&'static str>::from(recipe.category))
}

/// Keep the recipes matching `query`, preserving their order.
pub fn filter_recipes<'r>(recipes: &'r [Recipe], query: &str) -> Vec<&'r Recipe> {
    recipes
        .iter()
        .filter(|recipe| matches(recipe, query))
        .collect()
}

/// Owned variant of [`filter_recipes`], for callers that hand the result off.
pub fn retain_matching(recipes: Vec<Recipe>, query: &str) -> Vec<Recipe> {
    recipes
        .into_iter()
        .filter(|recipe| matches(recipe, query))
        .collect()
}
