//! Fixed per-type tables

use super::Category;

/// Interior/exterior category by type index
pub const CATEGORIES: [Category; 12] = [
    Category::Exterior,
    Category::Exterior,
    Category::Exterior,
    Category::Exterior,
    Category::Interior,
    Category::Exterior,
    Category::Interior,
    Category::Interior,
    Category::Interior,
    Category::Interior,
    Category::Exterior,
    Category::Exterior,
];

/// Type-level prompts used when the caller asks for the simplified form
pub const SIMPLE_PROMPTS: [&str; 12] = [
    "A building architectural drawing from a manga",
    "A building architectural render",
    "A building artistic architectural drawing",
    "A city",
    "The cross section of a building",
    "A facade elevation",
    "A floor plan",
    "The drawing of an interior from a manga",
    "The drawing of an interior",
    "Interior architectural render",
    "Isometric building",
    "Ground plan landscape architect",
];

/// Canned prompts for example sketches
pub const EXAMPLE_PROMPTS: [&str; 13] = [
    "black and white coloring book illustration of a building, white background, lineart, inkscape, simple lines",
    "black and white coloring book illustration of a building, white background, lineart, inkscape, simple lines",
    "black and white coloring book illustration of a building, white background, lineart, inkscape, simple lines",
    "black and white coloring book illustration of a city, white background, lineart, inkscape, simple lines",
    "cross section of a building, children coloring book, white background, lineart, inkscape, simple lines",
    "a building facade in a children coloring book, coloring page, lineart, white background",
    "coloring page of a simple floor plan, lineart, orthographic, CAD",
    "coloring page of an interior, line art, white background",
    "coloring page of an interior, line art, white background",
    "coloring page of an interior, line art, white background",
    "isometric building in a coloring book, line art, white background, simplistic",
    "a site map, black and white, coloring book drawing, line art",
    "some architectural drawing",
];

pub fn category_for(type_index: usize) -> Category {
    CATEGORIES.get(type_index).copied().unwrap_or(Category::Exterior)
}

pub fn simple_prompt(type_index: usize) -> Option<&'static str> {
    SIMPLE_PROMPTS.get(type_index).copied()
}

/// Falls back to the first prompt for unknown types
pub fn example_prompt(type_index: usize) -> &'static str {
    EXAMPLE_PROMPTS.get(type_index).copied().unwrap_or(EXAMPLE_PROMPTS[0])
}
