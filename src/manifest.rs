//! Image promotion between environment manifests of a GitOps repository.
//!
//! Manifests are patched as text: the first `- image: <value>` line wins.
//! YAML structure is not interpreted.

use std::sync::LazyLock;

use log::{info, warn};
use regex::{NoExpand, Regex};

use crate::error::{E2eError, Result};
use crate::providers::ScmProvider;

/// The captured value never includes the `\r` of a CRLF line ending.
const IMAGE_PATTERN: &str = r"- image: ([^\r\n]*)";

static IMAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(IMAGE_PATTERN).unwrap());

/// Returns the value of the first `- image:` line of `manifest`.
pub fn extract_image(manifest: &str) -> Result<String> {
    IMAGE_REGEX
        .captures(manifest)
        .and_then(|captures| captures.get(1))
        .map(|image| image.as_str().to_owned())
        .ok_or_else(|| E2eError::PatternNotFound {
            pattern: IMAGE_PATTERN.to_owned(),
        })
}

/// Rewrites the first `- image:` line of `target_manifest`.
///
/// The new value is `image` when given, otherwise the image found in
/// `source_manifest`. Everything outside the replaced value is left
/// byte-for-byte untouched.
pub fn promote(
    source_manifest: &str,
    target_manifest: &str,
    image: Option<&str>,
) -> Result<String> {
    let image = match image {
        Some(image) => image.to_owned(),
        None => extract_image(source_manifest)?,
    };

    let regex = &*IMAGE_REGEX;
    let matches = regex.find_iter(target_manifest).count();
    if matches == 0 {
        return Err(E2eError::PatternNotFound {
            pattern: IMAGE_PATTERN.to_owned(),
        });
    }
    if matches > 1 {
        warn!("Target manifest has {matches} image lines, only the first one is promoted");
    }

    let replacement = format!("- image: {image}");
    Ok(regex
        .replacen(target_manifest, 1, NoExpand(&replacement))
        .into_owned())
}

/// Copies the image deployed in one environment into another by committing
/// the patched target manifest on `branch`. Returns the commit sha.
pub async fn promote_in_repository<S: ScmProvider + ?Sized>(
    scm: &S,
    branch: &str,
    source_path: &str,
    target_path: &str,
    message: &str,
) -> Result<String> {
    let source = scm.get_file(branch, source_path).await?;
    let target = scm.get_file(branch, target_path).await?;

    let image = extract_image(&source)?;
    let patched = promote(&source, &target, Some(&image))?;

    info!("Promoting {image} from {source_path} to {target_path}");
    scm.edit_file(branch, target_path, &patched, message).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVELOPMENT: &str = "\
apiVersion: apps/v1
kind: Deployment
spec:
  template:
    spec:
      containers:
      - image: quay.io/org/my-app:sha256-abc123.sbom
        name: my-app
";

    const STAGE: &str = "\
apiVersion: apps/v1
kind: Deployment
spec:
  template:
    spec:
      containers:
      - image: quay.io/org/my-app:old
        name: my-app
";

    #[test]
    fn extracts_first_capture() {
        let image = extract_image("- image: registry/foo:sha256-abc123.sbom").unwrap();
        assert_eq!(image, "registry/foo:sha256-abc123.sbom");
    }

    #[test]
    fn extracts_image_from_deployment() {
        assert_eq!(
            extract_image(DEVELOPMENT).unwrap(),
            "quay.io/org/my-app:sha256-abc123.sbom"
        );
    }

    #[test]
    fn missing_image_line_is_a_permanent_error() {
        let err = extract_image("kind: Service\nspec: {}\n").unwrap_err();
        assert!(matches!(err, E2eError::PatternNotFound { .. }));
    }

    #[test]
    fn promote_replaces_only_the_image_line() {
        let patched = promote("", "a: 1\n- image: old\nb: 2\n", Some("new")).unwrap();
        assert_eq!(patched, "a: 1\n- image: new\nb: 2\n");
    }

    #[test]
    fn promote_takes_image_from_source_when_not_given() {
        let patched = promote(DEVELOPMENT, STAGE, None).unwrap();

        assert_eq!(
            patched,
            STAGE.replace(
                "quay.io/org/my-app:old",
                "quay.io/org/my-app:sha256-abc123.sbom"
            )
        );
    }

    #[test]
    fn promote_keeps_dollar_signs_literal() {
        let patched = promote("", "- image: old\n", Some("registry/app:$1")).unwrap();
        assert_eq!(patched, "- image: registry/app:$1\n");
    }

    #[test]
    fn crlf_line_endings_stay_out_of_the_image() {
        let target = "kind: Deployment\r\n- image: old\r\nname: app\r\n";

        assert_eq!(extract_image(target).unwrap(), "old");
        let patched = promote("", target, Some("new")).unwrap();
        assert_eq!(patched, "kind: Deployment\r\n- image: new\r\nname: app\r\n");
    }

    #[test]
    fn promote_only_touches_first_of_several_lines() {
        let target = "- image: one\n- image: two\n";
        let patched = promote("", target, Some("new")).unwrap();
        assert_eq!(patched, "- image: new\n- image: two\n");
    }

    #[test]
    fn promote_without_target_image_line_fails() {
        let err = promote(DEVELOPMENT, "kind: Service\n", None).unwrap_err();
        assert!(matches!(err, E2eError::PatternNotFound { .. }));
    }

    #[test]
    fn promote_without_source_image_line_fails() {
        let err = promote("kind: Service\n", STAGE, None).unwrap_err();
        assert!(matches!(err, E2eError::PatternNotFound { .. }));
    }
}
