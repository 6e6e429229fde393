//! In-progress recipe form state: the two ordered sequences, drag-to-reorder, and validation.
//!
//! Nothing here touches the network. A draft is validated into a [`RecipeForUpload`], which
//! carries both sequences verbatim to the persistence call.
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::basic_models::{Category, Difficulty, Recipe, RecipeForUpload};

/// Which of the two sequences an operation or gesture targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SequenceKind {
    Ingredient,
    Instruction,
}

/// The element a drag gesture started on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragOrigin {
    pub kind: SequenceKind,
    pub index: usize,
}

/// The first rule a submission broke. Rules are checked in declaration order.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title is required.")]
    MissingTitle,
    #[error("Description is required.")]
    MissingDescription,
    #[error("All ingredients are required.")]
    MissingIngredients,
    #[error("All instructions are required.")]
    MissingInstructions,
    #[error("Category is required.")]
    MissingCategory,
    #[error("Cooking time must be a positive number of minutes.")]
    InvalidCookingTime,
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn sequence_is_complete(items: &[String]) -> bool {
    !items.is_empty() && !items.iter().any(|item| is_blank(item))
}

impl RecipeForUpload {
    /// Check the document in a fixed order, reporting only the first failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if is_blank(&self.title) {
            return Err(ValidationError::MissingTitle);
        }
        if self.description.as_deref().map_or(true, is_blank) {
            return Err(ValidationError::MissingDescription);
        }
        if !sequence_is_complete(&self.ingredients) {
            return Err(ValidationError::MissingIngredients);
        }
        if !sequence_is_complete(&self.instructions) {
            return Err(ValidationError::MissingInstructions);
        }
        if self.category.is_none() {
            return Err(ValidationError::MissingCategory);
        }
        if self.cooking_time == Some(0) {
            return Err(ValidationError::InvalidCookingTime);
        }
        Ok(())
    }
}

/// A recipe form being filled in or edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "one_empty")]
    ingredients: Vec<String>,
    #[serde(default = "one_empty")]
    instructions: Vec<String>,
    #[serde(default = "default_category")]
    pub category: Option<Category>,
    #[serde(default)]
    pub cooking_time: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// The revision the draft was seeded from, if any
    #[serde(skip)]
    revision: Option<i64>,
    #[serde(skip)]
    drag: Option<DragOrigin>,
    #[serde(skip)]
    hover: Option<usize>,
}

fn one_empty() -> Vec<String> {
    vec![String::new()]
}

fn default_category() -> Option<Category> {
    Some(Category::Breakfast)
}

impl Default for RecipeDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl RecipeDraft {
    /// A blank form: one empty ingredient, one empty instruction, first category selected.
    pub fn new() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            ingredients: one_empty(),
            instructions: one_empty(),
            category: default_category(),
            cooking_time: None,
            difficulty: None,
            image_url: None,
            revision: None,
            drag: None,
            hover: None,
        }
    }

    /// Seed an edit form from a stored recipe.
    pub fn from_recipe(recipe: &Recipe) -> Self {
        let or_one_empty = |items: &[String]| {
            if items.is_empty() {
                one_empty()
            } else {
                items.to_vec()
            }
        };
        Self {
            title: recipe.title.clone(),
            description: recipe.description.clone().unwrap_or_default(),
            ingredients: or_one_empty(&recipe.ingredients),
            instructions: or_one_empty(&recipe.instructions),
            category: Some(recipe.category),
            cooking_time: recipe.cooking_time,
            difficulty: recipe.difficulty,
            image_url: recipe.image_url.clone(),
            revision: Some(recipe.revision),
            drag: None,
            hover: None,
        }
    }

    pub fn sequence(&self, kind: SequenceKind) -> &[String] {
        match kind {
            SequenceKind::Ingredient => &self.ingredients,
            SequenceKind::Instruction => &self.instructions,
        }
    }

    fn sequence_mut(&mut self, kind: SequenceKind) -> &mut Vec<String> {
        match kind {
            SequenceKind::Ingredient => &mut self.ingredients,
            SequenceKind::Instruction => &mut self.instructions,
        }
    }

    pub fn ingredients(&self) -> &[String] {
        &self.ingredients
    }

    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }

    /// Add one empty element at the end.
    pub fn append(&mut self, kind: SequenceKind) {
        self.sequence_mut(kind).push(String::new());
    }

    /// Append an element with text already filled in.
    pub fn push(&mut self, kind: SequenceKind, text: impl Into<String>) {
        self.sequence_mut(kind).push(text.into());
    }

    /// Replace the text at `index`. Returns false if there is no such element.
    pub fn update(&mut self, kind: SequenceKind, index: usize, text: impl Into<String>) -> bool {
        match self.sequence_mut(kind).get_mut(index) {
            Some(slot) => {
                *slot = text.into();
                true
            }
            None => false,
        }
    }

    /// Whether the remove control should be offered at all.
    pub fn can_remove(&self, kind: SequenceKind) -> bool {
        self.sequence(kind).len() > 1
    }

    /// Delete the element at `index`, keeping at least one element in the sequence.
    pub fn remove(&mut self, kind: SequenceKind, index: usize) -> bool {
        let can_remove = self.can_remove(kind);
        let items = self.sequence_mut(kind);
        if !can_remove || index >= items.len() {
            return false;
        }
        items.remove(index);
        true
    }

    /// Pointer pressed on an element: remember it as the drag origin.
    pub fn drag_start(&mut self, kind: SequenceKind, index: usize) {
        self.drag = Some(DragOrigin { kind, index });
    }

    /// Pointer moved over an element. Only used for highlighting.
    pub fn drag_over(&mut self, index: usize) {
        self.hover = Some(index);
    }

    /// Gesture ended without a drop.
    pub fn drag_end(&mut self) {
        self.drag = None;
        self.hover = None;
    }

    pub fn drag_origin(&self) -> Option<DragOrigin> {
        self.drag
    }

    pub fn hover_target(&self) -> Option<usize> {
        self.hover
    }

    /// Drop onto element `index` of the `kind` sequence.
    ///
    /// Moves the dragged element to `index`, shifting the ones in between by one. Drops with
    /// no origin, onto the other sequence, onto the origin itself, or outside the sequence
    /// leave both sequences untouched. Drag state is cleared either way.
    /// Returns whether anything moved.
    pub fn drop(&mut self, kind: SequenceKind, index: usize) -> bool {
        let origin = self.drag.take();
        self.hover = None;
        let Some(origin) = origin else {
            return false;
        };
        if origin.kind != kind || origin.index == index {
            return false;
        }
        let items = self.sequence_mut(kind);
        if origin.index >= items.len() || index >= items.len() {
            return false;
        }
        let moved = items.remove(origin.index);
        items.insert(index, moved);
        true
    }

    /// Check the form and produce the document to persist.
    pub fn validate(&self) -> Result<RecipeForUpload, ValidationError> {
        let upload = RecipeForUpload {
            title: self.title.clone(),
            description: Some(self.description.clone()),
            ingredients: self.ingredients.clone(),
            instructions: self.instructions.clone(),
            category: self.category,
            cooking_time: self.cooking_time,
            difficulty: self.difficulty,
            image_url: self.image_url.clone(),
            revision: self.revision,
        };
        upload.validate()?;
        Ok(upload)
    }
}
