//! Startup scripts for provisioned machines
//!
//! Both scripts are build-time templates over `{{name}}` placeholders,
//! rendered on the operator's machine before they reach instance metadata.
//! Neither ever receives a secret value: fleet nodes pull the deploy token
//! from Secret Manager at boot, and the CI node receives only the names of
//! the secrets inside its bootstrap config.

use base64::{engine::general_purpose, Engine as _};

use crate::error::TemplateError;
use crate::template::BuildTemplate;

const FLEET_STARTUP_TEMPLATE: &str = r#"#!/bin/bash
set -euo pipefail
exec &>> /var/log/fleet-startup.log

echo "=== Application node startup: $(hostname) ==="

export DEBIAN_FRONTEND=noninteractive
apt-get update
apt-get install -y git curl ca-certificates

curl -fsSL https://deb.nodesource.com/setup_20.x | bash -
apt-get install -y nodejs
npm install -g pm2

# The deploy token stays in the environment, off disk and off argv
GITHUB_TOKEN=$(gcloud secrets versions access latest --secret="{{github_token_secret}}")
export GITHUB_TOKEN

cat > /usr/local/bin/git-askpass <<'ASKPASS'
#!/bin/bash
case "$1" in
  Username*) echo "x-access-token" ;;
  Password*) echo "${GITHUB_TOKEN}" ;;
esac
ASKPASS
chmod +x /usr/local/bin/git-askpass
export GIT_ASKPASS=/usr/local/bin/git-askpass

git clone --branch "{{branch}}" --single-branch "{{clone_url}}" /opt/app
unset GITHUB_TOKEN

cd /opt/app
npm ci
PORT={{port}} pm2 start npm --name app -- run start:prod
pm2 save

echo "=== Application node ready on port {{port}} ==="
"#;

const CI_STARTUP_TEMPLATE: &str = r#"#!/bin/bash
set -euo pipefail
exec &>> /var/log/ci-startup.log

echo "=== CI node startup: $(hostname) ==="

# Startup scripts run on every boot; a completed bootstrap stays done
if grep -qs '"succeeded"' /var/lib/jenkins-provision/status.json; then
  echo "bootstrap already completed, nothing to do"
  exit 0
fi

mkdir -p /opt/jenkins-provision /var/lib/jenkins-provision

# The bootstrap binary is published separately; wait for it to appear
fetched=0
for attempt in $(seq 1 60); do
  if gcloud storage cp "gs://{{bucket}}/{{binary_object}}" /opt/jenkins-provision/jenkins-provision; then
    fetched=1
    break
  fi
  echo "bootstrap binary not published yet (attempt ${attempt}/60)"
  sleep 10
done
if [ "${fetched}" -ne 1 ]; then
  echo "giving up waiting for gs://{{bucket}}/{{binary_object}}"
  exit 1
fi
chmod +x /opt/jenkins-provision/jenkins-provision

base64 -d > /opt/jenkins-provision/bootstrap.yaml <<'CONFIG'
{{config_b64}}
CONFIG
chmod 600 /opt/jenkins-provision/bootstrap.yaml

/opt/jenkins-provision/jenkins-provision run --config /opt/jenkins-provision/bootstrap.yaml

echo "=== CI node bootstrap finished ==="
"#;

/// Startup script for fleet instances: install the Node.js runtime, clone
/// the application branch with a token pulled at boot, start it under pm2.
pub fn fleet_startup(
    github_token_secret: &str,
    clone_url: &str,
    branch: &str,
    port: u16,
) -> Result<String, TemplateError> {
    BuildTemplate::new(FLEET_STARTUP_TEMPLATE).render(&[
        ("github_token_secret", github_token_secret),
        ("clone_url", clone_url),
        ("branch", branch),
        ("port", &port.to_string()),
    ])
}

/// Startup script for the CI node: fetch the published bootstrap binary
/// from the assets bucket, write its config, hand over to it.
pub fn ci_startup(
    bucket: &str,
    binary_object: &str,
    settings_yaml: &str,
) -> Result<String, TemplateError> {
    let config_b64 = general_purpose::STANDARD.encode(settings_yaml.as_bytes());
    BuildTemplate::new(CI_STARTUP_TEMPLATE).render(&[
        ("bucket", bucket),
        ("binary_object", binary_object),
        ("config_b64", &config_b64),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_startup_renders_all_placeholders() {
        let script = fleet_startup(
            "acme-dev-github-token",
            "https://github.com/acme/storefront.git",
            "main",
            8080,
        )
        .unwrap();

        assert!(script.contains("--secret=\"acme-dev-github-token\""));
        assert!(script.contains("https://github.com/acme/storefront.git"));
        assert!(script.contains("PORT=8080"));
        assert!(!script.contains("{{"));
    }

    #[test]
    fn test_fleet_startup_keeps_token_out_of_git_config() {
        let script = fleet_startup("s", "https://github.com/a/b.git", "main", 8080).unwrap();
        // Token flows through GIT_ASKPASS, never into the clone URL.
        assert!(script.contains("GIT_ASKPASS"));
        assert!(!script.contains("x-access-token@"));
    }

    #[test]
    fn test_ci_startup_embeds_config_as_base64() {
        let yaml = "project: acme\n";
        let script = ci_startup("acme-dev-assets", "jenkins-provision", yaml).unwrap();

        let encoded = general_purpose::STANDARD.encode(yaml.as_bytes());
        assert!(script.contains(&encoded));
        assert!(script.contains("gs://acme-dev-assets/jenkins-provision"));
        assert!(!script.contains("{{"));
        // The raw YAML itself never appears in the script body.
        assert!(!script.contains("project: acme"));
    }

    #[test]
    fn test_ci_startup_skips_after_a_completed_bootstrap() {
        let script = ci_startup("b", "jenkins-provision", "project: acme\n").unwrap();
        assert!(script.contains(r#"grep -qs '"succeeded"' /var/lib/jenkins-provision/status.json"#));
    }
}
