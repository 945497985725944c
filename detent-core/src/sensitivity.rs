// Sensitivity Classifier
// Flags jobs that are likely to publish, deploy or otherwise reach outside the sandbox

use crate::workflow::Job;

use std::fmt;

/// Substrings of a job's display name or id that mark it as sensitive.
pub const SENSITIVE_KEYWORDS: &[&str] = &[
    "release",
    "deploy",
    "publish",
    "production",
    "staging",
    "migrate",
    "migration",
    "rollout",
    "promote",
    "provision",
];

/// Actions known to deploy or publish, compared without their `@ref`.
pub const SENSITIVE_ACTIONS: &[&str] = &[
    "actions/create-release",
    "actions/deploy-pages",
    "actions/upload-release-asset",
    "amondnet/vercel-action",
    "aws-actions/amazon-ecs-deploy-task-definition",
    "aws-actions/aws-cloudformation-github-deploy",
    "azure/webapps-deploy",
    "azure/functions-action",
    "changesets/action",
    "cloudflare/wrangler-action",
    "docker/build-push-action",
    "google-github-actions/deploy-appengine",
    "google-github-actions/deploy-cloudrun",
    "goreleaser/goreleaser-action",
    "helm/chart-releaser-action",
    "jamesives/github-pages-deploy-action",
    "ncipollo/release-action",
    "peaceiris/actions-gh-pages",
    "pypa/gh-action-pypi-publish",
    "softprops/action-gh-release",
    "superfly/flyctl-actions",
];

/// Fragments of an action reference that structurally resemble a deployment.
pub const SENSITIVE_ACTION_PATTERNS: &[&str] = &[
    "/deploy",
    "-deploy",
    "/publish",
    "-publish",
    "/release",
    "-release",
    "/gh-pages",
    "-gh-pages",
];

/// Command fragments for package publishing, container pushes,
/// infrastructure changes and remote deploys.
pub const SENSITIVE_COMMANDS: &[&str] = &[
    // package registries
    "npm publish",
    "yarn publish",
    "yarn npm publish",
    "pnpm publish",
    "cargo publish",
    "twine upload",
    "poetry publish",
    "flit publish",
    "gem push",
    "nuget push",
    "mvn deploy",
    "gradle publish",
    "gradlew publish",
    "gh release create",
    "goreleaser release",
    // container registries
    "docker push",
    "podman push",
    "buildah push",
    "docker buildx build --push",
    "helm push",
    // infrastructure
    "terraform apply",
    "terraform destroy",
    "tofu apply",
    "pulumi up",
    "cdk deploy",
    "kubectl apply",
    "kubectl rollout",
    "helm upgrade",
    "helm install",
    "aws s3 sync",
    "aws s3 cp",
    "aws ecs update-service",
    "aws lambda update-function-code",
    // remote deploys
    "serverless deploy",
    "sls deploy",
    "gcloud app deploy",
    "gcloud run deploy",
    "firebase deploy",
    "vercel --prod",
    "netlify deploy",
    "flyctl deploy",
    "fly deploy",
    "wrangler deploy",
    "wrangler publish",
    "heroku container:release",
    "git push",
    "scp ",
    "rsync -e ssh",
];

/// Why a job was classified as sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sensitivity {
    /// Job name or id contains a keyword
    Keyword(&'static str),
    /// A step uses a known or deploy-shaped action
    Action(String),
    /// A step runs a command matching a fragment
    Command(&'static str),
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sensitivity::Keyword(k) => write!(f, "name contains '{}'", k),
            Sensitivity::Action(a) => write!(f, "uses action '{}'", a),
            Sensitivity::Command(c) => write!(f, "runs '{}'", c.trim_end()),
        }
    }
}

/// The pattern tables driving classification.
///
/// `Default` uses the built-in tables; callers may swap any of them without
/// changing the matching logic.
#[derive(Debug, Clone, Copy)]
pub struct SensitivityRules {
    pub keywords: &'static [&'static str],
    pub actions: &'static [&'static str],
    pub action_patterns: &'static [&'static str],
    pub commands: &'static [&'static str],
}

impl Default for SensitivityRules {
    fn default() -> Self {
        Self {
            keywords: SENSITIVE_KEYWORDS,
            actions: SENSITIVE_ACTIONS,
            action_patterns: SENSITIVE_ACTION_PATTERNS,
            commands: SENSITIVE_COMMANDS,
        }
    }
}

impl SensitivityRules {
    /// Whether the job is sensitive.
    pub fn is_sensitive(&self, job_id: &str, job: &Job) -> bool {
        self.classify(job_id, job).is_some()
    }

    /// First matching reason, checking identity, then actions, then commands.
    pub fn classify(&self, job_id: &str, job: &Job) -> Option<Sensitivity> {
        self.match_identity(job_id, job)
            .or_else(|| self.match_actions(job))
            .or_else(|| self.match_commands(job))
    }

    fn match_identity(&self, job_id: &str, job: &Job) -> Option<Sensitivity> {
        let mut haystacks = vec![job_id.to_lowercase()];
        if let Some(name) = &job.name {
            haystacks.push(name.to_lowercase());
        }

        self.keywords
            .iter()
            .find(|keyword| haystacks.iter().any(|h| h.contains(*keyword)))
            .map(|keyword| Sensitivity::Keyword(*keyword))
    }

    fn match_actions(&self, job: &Job) -> Option<Sensitivity> {
        job.steps()
            .iter()
            .filter_map(|step| step.uses.as_deref())
            .find(|uses| self.is_sensitive_action(uses))
            .map(|uses| Sensitivity::Action(uses.to_string()))
    }

    fn is_sensitive_action(&self, uses: &str) -> bool {
        let action = uses.split('@').next().unwrap_or(uses).to_lowercase();
        self.actions.iter().any(|known| action == *known)
            || self
                .action_patterns
                .iter()
                .any(|pattern| action.contains(pattern))
    }

    fn match_commands(&self, job: &Job) -> Option<Sensitivity> {
        job.steps()
            .iter()
            .filter_map(|step| step.run.as_deref())
            .find_map(|run| {
                let run = run.to_lowercase();
                self.commands
                    .iter()
                    .find(|fragment| run.contains(*fragment))
                    .map(|fragment| Sensitivity::Command(*fragment))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Step, WorkflowParser};

    fn job_with_steps(name: Option<&str>, steps: Vec<Step>) -> Job {
        Job {
            name: name.map(str::to_string),
            steps: Some(steps),
            ..Default::default()
        }
    }

    fn uses(action: &str) -> Step {
        Step {
            uses: Some(action.to_string()),
            ..Default::default()
        }
    }

    fn run(cmd: &str) -> Step {
        Step {
            run: Some(cmd.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_keyword_in_job_id() {
        let rules = SensitivityRules::default();
        let job = job_with_steps(None, vec![run("echo hi")]);

        assert_eq!(
            rules.classify("publish-release", &job),
            Some(Sensitivity::Keyword("release"))
        );
        assert!(!rules.is_sensitive("build", &job));
    }

    #[test]
    fn test_keyword_in_display_name_is_case_insensitive() {
        let rules = SensitivityRules::default();
        let job = job_with_steps(Some("Deploy to Production"), vec![run("make")]);
        assert!(rules.is_sensitive("job1", &job));
    }

    #[test]
    fn test_docker_push_command() {
        let rules = SensitivityRules::default();
        let job = job_with_steps(
            None,
            vec![run("docker build -t myrepo/image ."), run("docker push myrepo/image")],
        );
        assert_eq!(
            rules.classify("build", &job),
            Some(Sensitivity::Command("docker push"))
        );
    }

    #[test]
    fn test_known_action_ignores_version() {
        let rules = SensitivityRules::default();
        let job = job_with_steps(None, vec![uses("actions/checkout@v4"), uses("softprops/action-gh-release@v2")]);
        assert_eq!(
            rules.classify("ci", &job),
            Some(Sensitivity::Action("softprops/action-gh-release@v2".to_string()))
        );
    }

    #[test]
    fn test_deploy_shaped_action() {
        let rules = SensitivityRules::default();
        let job = job_with_steps(None, vec![uses("acme/k8s-deploy@main")]);
        assert!(rules.is_sensitive("ci", &job));

        let job = job_with_steps(None, vec![uses("acme/publish/npm@v1")]);
        assert!(rules.is_sensitive("ci", &job));
    }

    #[test]
    fn test_ordinary_ci_job_is_not_sensitive() {
        let rules = SensitivityRules::default();
        let job = job_with_steps(
            Some("Test Suite"),
            vec![
                uses("actions/checkout@v4"),
                uses("actions/setup-node@v4"),
                run("npm ci\nnpm test"),
            ],
        );
        assert_eq!(rules.classify("test", &job), None);
    }

    #[test]
    fn test_reusable_job_checks_identity_only() {
        let rules = SensitivityRules::default();
        let job = Job {
            uses: Some("org/repo/.github/workflows/ship.yml@main".to_string()),
            ..Default::default()
        };
        assert!(!rules.is_sensitive("call-lint", &job));
        assert!(rules.is_sensitive("call-deploy", &job));
    }

    #[test]
    fn test_swapped_tables() {
        const ONLY_SHIP: &[&str] = &["ship"];
        let rules = SensitivityRules {
            keywords: ONLY_SHIP,
            actions: &[],
            action_patterns: &[],
            commands: &[],
        };
        let job = job_with_steps(None, vec![run("docker push x")]);
        assert!(rules.is_sensitive("ship-it", &job));
        assert!(!rules.is_sensitive("build", &job));
    }

    #[test]
    fn test_classify_from_yaml() {
        let yaml = r#"
on: push
jobs:
  infra:
    name: Infrastructure
    steps:
      - uses: hashicorp/setup-terraform@v3
      - run: |
          terraform init
          terraform apply -auto-approve
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let rules = SensitivityRules::default();
        let reason = rules.classify("infra", &workflow.jobs["infra"]).unwrap();
        assert_eq!(reason, Sensitivity::Command("terraform apply"));
        assert_eq!(reason.to_string(), "runs 'terraform apply'");
    }
}
