//! Print the CRD manifests as a multi-document YAML stream

use crds::{IPAddress, IPAddressClaim, NutanixIPPool};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [
        NutanixIPPool::crd(),
        IPAddressClaim::crd(),
        IPAddress::crd(),
    ];
    for crd in &crds {
        print!("---\n{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
