//! Deterministic fallback remediation hints.
//!
//! One template per defect type, substituting the page path and a
//! truncation of the defect's details or title. Pure: identical input,
//! identical output.

use crate::defects::{Defect, DefectType};
use crate::testers::{truncate, url_path};

pub fn template_prompt(defect: &Defect) -> String {
    let path = url_path(&defect.page);
    match defect.defect_type {
        DefectType::ConsoleError => format!(
            "A script on {path} reports \"{}\". Open the page with the browser developer console, \
             reproduce the error, and fix or remove the failing code. If the error comes from a \
             third-party snippet, update it to its current version or load it only where it is needed.",
            truncate(&defect.details, 140)
        ),
        DefectType::NetworkError => format!(
            "A request made by {path} is failing: {}. Check that the resource still exists at that \
             URL and that the server responds without an error status. Update the reference if the \
             resource moved, or remove it if it is no longer used.",
            truncate(&defect.details, 140)
        ),
        DefectType::BrokenLink => format!(
            "A link on {path} points to a destination that no longer resolves ({}). Update the link \
             to the current address of the content, or remove it if the destination is gone. \
             Redirecting the old URL on your own site also fixes inbound references.",
            truncate(&defect.title, 120)
        ),
        DefectType::BrokenImage => format!(
            "An image on {path} fails to load: {}. Confirm the file exists at the referenced URL and \
             is publicly readable, and fix the src attribute if the file moved. While you are there, \
             make sure the image has descriptive alt text.",
            truncate(&defect.details, 140)
        ),
        DefectType::Accessibility => format!(
            "An accessibility check failed on {path}: {}. Address the affected elements listed in \
             the finding so assistive technology can interpret them. These fixes are usually small \
             markup changes such as adding labels, alt text, or language attributes.",
            truncate(&defect.title, 120)
        ),
        DefectType::Responsive => format!(
            "Content on {path} is wider than the screen: {}. Find the element that sets a fixed \
             width or large margin and let it shrink with the viewport, for example with max-width \
             and flexible units. Test at the reported width after the change.",
            truncate(&defect.details, 140)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defects::Severity;

    fn sample(defect_type: DefectType) -> Defect {
        Defect::new(
            defect_type,
            Severity::Warning,
            "Some title",
            "Some details about the defect",
            "http://site.example/pricing",
        )
    }

    #[test]
    fn test_every_type_has_a_template() {
        for defect_type in DefectType::ALL {
            let prompt = template_prompt(&sample(defect_type));
            assert!(!prompt.is_empty(), "{defect_type} template is empty");
            assert!(prompt.contains("/pricing"), "{defect_type} template misses the path");
        }
    }

    #[test]
    fn test_templates_are_pure() {
        let defect = sample(DefectType::BrokenImage);
        assert_eq!(template_prompt(&defect), template_prompt(&defect));
    }
}
