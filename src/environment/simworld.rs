use super::{Host, NetworkWorld, Software};
use crate::error::Result;
use crate::knowledge::{
    AccessLevel, AccessRequirement, Credential, CredentialKind, DataArtifact, DataContent,
    DataOrigin, ExploitCategory, Gain, NodeId, Vulnerability,
};

const PUBLIC_IP: &str = "79.1.1.100";
const UBUNTU: (&str, &str) = ("Ubuntu", "16.04.07 LTS");

fn credential(
    kind: CredentialKind,
    grant: AccessLevel,
    target: NodeId,
    service: &str,
    origin: DataOrigin,
    requires: AccessRequirement,
) -> DataArtifact {
    DataArtifact {
        content: DataContent::Credential(Credential {
            kind,
            grant,
            target,
            service: service.to_string(),
        }),
        origin,
        requires,
    }
}

fn openssh() -> Software {
    Software::remote("openssh-server", "7.3").with_vulnerability(Vulnerability::public(
        "CVE-2016-10012",
        ExploitCategory::PrivilegeEscalation,
    ))
}

/// Attacker on the internet, a router forwarding to the web server and the
/// admin workstation, and a database only reachable from inside.
pub(super) fn build() -> Result<NetworkWorld> {
    use NodeId::*;

    let attacker = Host::new(Attacker, "attacker.local", "Kali Linux", "2020.3")
        .with_ips(Some("203.0.113.7"), None);

    let router = Host::new(Router, "router.simworld.com", "OpenWRT", "18.06.0")
        .with_ips(Some(PUBLIC_IP), Some("10.1.1.1"));

    let webserver = Host::new(WebServer, "webserver.simworld.com", UBUNTU.0, UBUNTU.1)
        .with_ips(Some(PUBLIC_IP), Some("10.1.1.2"))
        .with_software(Software::remote("HTTP", "2"))
        .with_software(Software::remote("HTTPS/TLS", "1.3"))
        .with_software(openssh())
        .with_software(Software::remote("PHP", "7.1.19").with_vulnerability(
            Vulnerability::public("CVE-2019-11043", ExploitCategory::PublicFacingApplication),
        ))
        .with_software(Software::remote("nginx", "1.09").with_vulnerability(
            Vulnerability::public("CVE-2016-1247", ExploitCategory::PrivilegeEscalation),
        ))
        .with_data(
            0,
            credential(
                CredentialKind::PasswordFile,
                AccessLevel::Root,
                WebServer,
                "shadow",
                DataOrigin::Local,
                AccessRequirement::User,
            ),
        )
        .with_data(
            1,
            credential(
                CredentialKind::Key,
                AccessLevel::Root,
                AdminPc,
                "ssh",
                DataOrigin::Local,
                AccessRequirement::Root,
            ),
        );

    let admin = Host::new(AdminPc, "admin.simworld.com", UBUNTU.0, UBUNTU.1)
        .with_ips(Some(PUBLIC_IP), Some("10.1.1.3"))
        .with_software(Software::remote("telnetd", "0.17").with_vulnerability(
            Vulnerability::public("CVE-2020-10188", ExploitCategory::PublicFacingApplication),
        ))
        .with_software(
            openssh().with_vulnerability(Vulnerability::zero_day(ExploitCategory::ClientExecution)),
        )
        .with_data(
            0,
            credential(
                CredentialKind::Key,
                AccessLevel::User,
                WebServer,
                "ssh",
                DataOrigin::Local,
                AccessRequirement::Root,
            ),
        );

    let database = Host::new(Database, "database.simworld.com", UBUNTU.0, UBUNTU.1)
        .with_ips(Some(PUBLIC_IP), Some("10.1.1.4"))
        .with_software(Software::remote("Oracle MySQL Server", "8.0.13").with_vulnerability(
            Vulnerability::public("CVE-2019-2534", ExploitCategory::ClientExecution),
        ))
        .with_software(Software::local("sudo", "1.8.16").with_vulnerability(
            Vulnerability::public("CVE-2021-3156", ExploitCategory::PrivilegeEscalation),
        ))
        .with_data(
            0,
            DataArtifact {
                content: DataContent::Inert { gain: Gain::Low },
                origin: DataOrigin::Local,
                requires: AccessRequirement::Root,
            },
        );

    NetworkWorld::builder(Attacker, Router)
        .host(attacker)
        .host(router)
        .host(webserver)
        .host(admin)
        .host(database)
        .link_all(Attacker, &[Router, WebServer, AdminPc])
        .link_all(Router, &[WebServer, AdminPc, Database])
        .link_all(WebServer, &[Router, AdminPc, Database])
        .link_all(AdminPc, &[Router, WebServer, Database])
        .link_all(Database, &[Router, WebServer, AdminPc])
        .forward(WebServer)
        .forward(AdminPc)
        .whitelist(Attacker, WebServer, &["HTTP", "HTTPS/TLS", "PHP", "nginx"])
        .whitelist(Attacker, AdminPc, &["openssh-server"])
        .build()
}
