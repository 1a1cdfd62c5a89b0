//! Jenkins XML and Groovy artifacts
//!
//! These are the documents pushed through the Jenkins CLI: a credential
//! object, one pipeline job per repository and the administrator rotation
//! script. Values are escaped for their host syntax before substitution.

use anyhow::Result;

use crate::template::{escape_groovy, escape_xml, render};

const CREDENTIALS_XML_TEMPLATE: &str = r#"<com.cloudbees.plugins.credentials.impl.UsernamePasswordCredentialsImpl>
  <scope>GLOBAL</scope>
  <id>__CREDENTIALS_ID__</id>
  <description>GitHub access token for pipeline checkouts</description>
  <username>x-access-token</username>
  <password>__TOKEN__</password>
</com.cloudbees.plugins.credentials.impl.UsernamePasswordCredentialsImpl>
"#;

const JOB_XML_TEMPLATE: &str = r#"<?xml version='1.1' encoding='UTF-8'?>
<flow-definition plugin="workflow-job">
  <description>Deployment pipeline for __REPO_SLUG__</description>
  <keepDependencies>false</keepDependencies>
  <properties>
    <org.jenkinsci.plugins.workflow.job.properties.PipelineTriggersJobProperty>
      <triggers>
        <com.cloudbees.jenkins.GitHubPushTrigger plugin="github">
          <spec></spec>
        </com.cloudbees.jenkins.GitHubPushTrigger>
      </triggers>
    </org.jenkinsci.plugins.workflow.job.properties.PipelineTriggersJobProperty>
  </properties>
  <definition class="org.jenkinsci.plugins.workflow.cps.CpsScmFlowDefinition" plugin="workflow-cps">
    <scm class="hudson.plugins.git.GitSCM" plugin="git">
      <configVersion>2</configVersion>
      <userRemoteConfigs>
        <hudson.plugins.git.UserRemoteConfig>
          <url>__REPO_URL__</url>
          <credentialsId>__CREDENTIALS_ID__</credentialsId>
        </hudson.plugins.git.UserRemoteConfig>
      </userRemoteConfigs>
      <branches>
        <hudson.plugins.git.BranchSpec>
          <name>*/__BRANCH__</name>
        </hudson.plugins.git.BranchSpec>
      </branches>
      <doGenerateSubmoduleConfigurations>false</doGenerateSubmoduleConfigurations>
      <submoduleCfg class="empty-list"/>
      <extensions/>
    </scm>
    <scriptPath>Jenkinsfile</scriptPath>
    <lightweight>true</lightweight>
  </definition>
  <disabled>false</disabled>
</flow-definition>
"#;

const ADMIN_GROOVY_TEMPLATE: &str = r#"import jenkins.model.Jenkins
import jenkins.install.InstallState
import hudson.security.HudsonPrivateSecurityRealm
import hudson.security.FullControlOnceLoggedInAuthorizationStrategy

def instance = Jenkins.get()

def realm = new HudsonPrivateSecurityRealm(false)
realm.createAccount('__ADMIN_USER__', '__ADMIN_PASSWORD__')
instance.setSecurityRealm(realm)

def strategy = new FullControlOnceLoggedInAuthorizationStrategy()
strategy.setAllowAnonymousRead(false)
instance.setAuthorizationStrategy(strategy)

instance.setInstallState(InstallState.INITIAL_SETUP_COMPLETED)
instance.save()
"#;

/// Credential object holding the GitHub token, for create-credentials-by-xml.
pub fn credentials_xml(credentials_id: &str, token: &str) -> Result<String> {
    let id = escape_xml(credentials_id);
    let token = escape_xml(token);
    render(
        CREDENTIALS_XML_TEMPLATE,
        &[("CREDENTIALS_ID", id.as_str()), ("TOKEN", token.as_str())],
    )
}

/// Pipeline job definition for one repository, for create-job.
///
/// The job checks out the repository at the configured branch, runs its
/// Jenkinsfile and rebuilds on every GitHub push event.
pub fn job_xml(repo_slug: &str, repo_url: &str, branch: &str, credentials_id: &str) -> Result<String> {
    let slug = escape_xml(repo_slug);
    let url = escape_xml(repo_url);
    let branch = escape_xml(branch);
    let id = escape_xml(credentials_id);
    render(
        JOB_XML_TEMPLATE,
        &[
            ("REPO_SLUG", slug.as_str()),
            ("REPO_URL", url.as_str()),
            ("BRANCH", branch.as_str()),
            ("CREDENTIALS_ID", id.as_str()),
        ],
    )
}

/// Groovy script that replaces the generated admin with a permanent account.
pub fn admin_groovy(admin_user: &str, admin_password: &str) -> Result<String> {
    let user = escape_groovy(admin_user);
    let password = escape_groovy(admin_password);
    render(
        ADMIN_GROOVY_TEMPLATE,
        &[("ADMIN_USER", user.as_str()), ("ADMIN_PASSWORD", password.as_str())],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_xml_escapes_token() {
        let xml = credentials_xml("github-token-v1", "ghp_a<b>&c").unwrap();
        assert!(xml.contains("<id>github-token-v1</id>"));
        assert!(xml.contains("<password>ghp_a&lt;b&gt;&amp;c</password>"));
        assert!(!xml.contains("__TOKEN__"));
    }

    #[test]
    fn test_job_xml_wires_repository_and_trigger() {
        let xml = job_xml(
            "acme/storefront",
            "https://github.com/acme/storefront.git",
            "main",
            "github-token-v1",
        )
        .unwrap();
        assert!(xml.contains("<url>https://github.com/acme/storefront.git</url>"));
        assert!(xml.contains("<name>*/main</name>"));
        assert!(xml.contains("<credentialsId>github-token-v1</credentialsId>"));
        assert!(xml.contains("GitHubPushTrigger"));
        assert!(xml.contains("<scriptPath>Jenkinsfile</scriptPath>"));
        assert!(!xml.contains("__"));
    }

    #[test]
    fn test_admin_groovy_escapes_quotes() {
        let script = admin_groovy("admin", "pa'ss").unwrap();
        assert!(script.contains(r"createAccount('admin', 'pa\'ss')"));
        assert!(script.contains("INITIAL_SETUP_COMPLETED"));
    }
}
