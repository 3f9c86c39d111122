//! Built-in knowledge corpus loaded on first run: UI navigation patterns for
//! the editor's pages and a few hand-picked material presets.

pub struct UiPatternSeed {
    pub id: &'static str,
    pub description: &'static str,
    pub page: &'static str,
    pub selector: &'static str,
    pub category: &'static str,
}

pub struct MaterialSeed {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: &'static str,
    pub color: &'static str,
}

pub fn ui_patterns() -> &'static [UiPatternSeed] {
    &[
        UiPatternSeed {
            id: "homepage-open-project-card",
            description: "Click on a project card to open a scene from the homepage",
            page: "homepage",
            selector: ".project-card, [data-testid=\"project-card\"]",
            category: "navigation",
        },
        UiPatternSeed {
            id: "homepage-search-projects",
            description: "Search for projects by name using the search box",
            page: "homepage",
            selector: "input[type=\"search\"], .search-input",
            category: "search",
        },
        UiPatternSeed {
            id: "homepage-create-new",
            description: "Create a new project",
            page: "homepage",
            selector: "button:has-text(\"Create\"), [data-testid=\"create-button\"]",
            category: "creation",
        },
        UiPatternSeed {
            id: "editor-select-object",
            description: "Select an object in the 3D scene by name",
            page: "scene-editor",
            selector: "canvas",
            category: "selection",
        },
        UiPatternSeed {
            id: "editor-object-panel",
            description: "Access the object properties panel in the right sidebar",
            page: "scene-editor",
            selector: ".properties-panel, .inspector-panel",
            category: "inspection",
        },
        UiPatternSeed {
            id: "editor-material-properties",
            description: "View or edit material properties of the selected object",
            page: "scene-editor",
            selector: ".material-section, [data-section=\"material\"]",
            category: "materials",
        },
        UiPatternSeed {
            id: "editor-scene-hierarchy",
            description: "View the scene hierarchy and layers panel",
            page: "scene-editor",
            selector: ".hierarchy-panel, .layers-panel",
            category: "navigation",
        },
        UiPatternSeed {
            id: "editor-animation-panel",
            description: "Access the animation timeline and settings",
            page: "scene-editor",
            selector: ".animation-panel, [data-testid=\"timeline\"]",
            category: "animation",
        },
        UiPatternSeed {
            id: "library-browse-materials",
            description: "Browse available materials in the library",
            page: "library",
            selector: ".material-grid, [data-category=\"materials\"]",
            category: "materials",
        },
        UiPatternSeed {
            id: "library-search-materials",
            description: "Search for a specific material type such as glass or metal",
            page: "library",
            selector: "input[placeholder*=\"Search materials\"]",
            category: "search",
        },
        UiPatternSeed {
            id: "global-back-to-home",
            description: "Navigate back to the homepage via the top-left logo",
            page: "all",
            selector: ".logo, a[href=\"/home\"]",
            category: "navigation",
        },
    ]
}

pub fn materials() -> &'static [MaterialSeed] {
    &[
        MaterialSeed {
            id: "glass-blue-transparent",
            name: "Glossy Blue Glass",
            description: "Transparent blue glass material with high glossiness and refraction, \
                          perfect for modern UI elements and buttons",
            kind: "glass",
            color: "#4A90E2",
        },
        MaterialSeed {
            id: "metal-chrome",
            name: "Chrome Metal",
            description: "Highly reflective chrome metal material, great for futuristic and \
                          robotic elements",
            kind: "metal",
            color: "#CCCCCC",
        },
        MaterialSeed {
            id: "glass-frosted",
            name: "Frosted Glass",
            description: "Semi-transparent frosted glass with a subtle blur effect, ideal for \
                          glassmorphism designs",
            kind: "glass",
            color: "#FFFFFF",
        },
    ]
}
