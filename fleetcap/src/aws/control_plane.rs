use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use crate::aws::{arn_name, AwsCli};
use crate::discovery::{FleetControlPlane, InstanceInfo};
use crate::target::NetworkAddresses;
use crate::vec_of_strings;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ListClustersResponse {
    #[serde(default)]
    cluster_arns: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ListTasksResponse {
    #[serde(default)]
    task_arns: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
struct DescribeTasksResponse {
    #[serde(default)]
    tasks: Vec<EcsTask>,
}

#[derive(Deserialize, Debug, Default)]
struct EcsTask {
    #[serde(default)]
    containers: Vec<EcsContainer>,
    #[serde(default)]
    attachments: Vec<EcsAttachment>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct EcsContainer {
    #[serde(default)]
    network_interfaces: Vec<EcsNetworkInterface>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct EcsNetworkInterface {
    private_ipv4_address: Option<String>,
    ipv6_address: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct EcsAttachment {
    #[serde(default)]
    details: Vec<EcsAttachmentDetail>,
}

#[derive(Deserialize, Debug, Default)]
struct EcsAttachmentDetail {
    name: String,
    value: Option<String>,
}

impl EcsTask {
    /// The first container interface, falling back to the awsvpc ENI attachment
    fn addresses(&self) -> NetworkAddresses {
        if let Some(interface) = self.containers.iter().flat_map(|c| c.network_interfaces.iter()).next() {
            return NetworkAddresses {
                ipv4: interface.private_ipv4_address.clone(),
                ipv6: interface.ipv6_address.clone(),
            };
        }
        let detail = |name: &str| {
            self.attachments.iter()
                .flat_map(|a| a.details.iter())
                .find(|d| d.name == name)
                .and_then(|d| d.value.clone())
        };
        NetworkAddresses { ipv4: detail("privateIPv4Address"), ipv6: detail("ipv6Address") }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct Ec2Instance {
    instance_id: String,
    state: Option<Ec2State>,
    private_ip_address: Option<String>,
    #[serde(default)]
    tags: Vec<Ec2Tag>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct Ec2State {
    name: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct Ec2Tag {
    key: String,
    value: String,
}

impl From<Ec2Instance> for InstanceInfo {
    fn from(instance: Ec2Instance) -> Self {
        let name = instance.tags.iter().find(|t| t.key == "Name").map(|t| t.value.clone());
        InstanceInfo {
            id: instance.instance_id,
            name,
            state: instance.state.map(|s| s.name),
            private_ip: instance.private_ip_address,
        }
    }
}

/// ECS and EC2 through `aws ecs ...` and `aws ec2 describe-instances`
pub struct AwsControlPlane {
    cli: AwsCli,
}

impl AwsControlPlane {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl FleetControlPlane for AwsControlPlane {
    async fn list_groups(&self, region: &str) -> anyhow::Result<Vec<String>> {
        let res: ListClustersResponse = self.cli.json(region, vec_of_strings!["ecs", "list-clusters"]).await?;
        Ok(res.cluster_arns.iter().map(|arn| arn_name(arn).to_string()).collect())
    }

    async fn list_members(&self, region: &str, group: &str) -> anyhow::Result<Vec<String>> {
        let res: ListTasksResponse = self.cli
            .json(region, vec_of_strings!["ecs", "list-tasks", "--cluster", group, "--desired-status", "RUNNING"])
            .await?;
        Ok(res.task_arns.iter().map(|arn| arn_name(arn).to_string()).collect())
    }

    async fn describe_member(&self, region: &str, group: &str, member: &str) -> anyhow::Result<NetworkAddresses> {
        let res: DescribeTasksResponse = self.cli
            .json(region, vec_of_strings!["ecs", "describe-tasks", "--cluster", group, "--tasks", member])
            .await
            .with_context(|| format!("describing task {member}"))?;
        match res.tasks.first() {
            Some(task) => Ok(task.addresses()),
            None => bail!("task {member} was not found in {group}"),
        }
    }

    async fn list_instances(&self, region: &str) -> anyhow::Result<Vec<InstanceInfo>> {
        let res: DescribeInstancesResponse = self.cli.json(region, vec_of_strings!["ec2", "describe-instances"]).await?;
        Ok(res.reservations.into_iter()
            .flat_map(|r| r.instances)
            .map(InstanceInfo::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_addresses() {
        let res: DescribeTasksResponse = serde_json::from_str(r#"{
            "tasks": [{
                "taskArn": "arn:aws:ecs:us-east-1:123:task/sbc/abc",
                "containers": [{ "name": "sbc", "networkInterfaces": [
                    { "attachmentId": "x", "privateIpv4Address": "10.0.1.5", "ipv6Address": "fd00::5" }
                ]}]
            }],
            "failures": []
        }"#).unwrap();
        let addresses = res.tasks[0].addresses();
        assert_eq!(addresses.ipv4.as_deref(), Some("10.0.1.5"));
        assert_eq!(addresses.ipv6.as_deref(), Some("fd00::5"));
    }

    #[test]
    fn test_parse_task_attachment_fallback() {
        let res: DescribeTasksResponse = serde_json::from_str(r#"{
            "tasks": [{
                "containers": [{ "name": "sbc" }],
                "attachments": [{ "type": "ElasticNetworkInterface", "details": [
                    { "name": "subnetId", "value": "subnet-1" },
                    { "name": "privateIPv4Address", "value": "10.0.2.7" }
                ]}]
            }]
        }"#).unwrap();
        let addresses = res.tasks[0].addresses();
        assert_eq!(addresses.ipv4.as_deref(), Some("10.0.2.7"));
        assert_eq!(addresses.ipv6, None);

        let bare: DescribeTasksResponse = serde_json::from_str(r#"{ "tasks": [{}] }"#).unwrap();
        assert_eq!(bare.tasks[0].addresses(), NetworkAddresses::not_available());
    }

    #[test]
    fn test_parse_instances() {
        let res: DescribeInstancesResponse = serde_json::from_str(r#"{
            "Reservations": [
                { "Instances": [{
                    "InstanceId": "i-0abc",
                    "State": { "Code": 16, "Name": "running" },
                    "PrivateIpAddress": "10.1.0.9",
                    "Tags": [{ "Key": "env", "Value": "lab" }, { "Key": "Name", "Value": "sbc-edge-1" }]
                }]},
                { "Instances": [{ "InstanceId": "i-0def", "State": { "Code": 80, "Name": "stopped" } }] }
            ]
        }"#).unwrap();
        let instances: Vec<InstanceInfo> = res.reservations.into_iter()
            .flat_map(|r| r.instances)
            .map(InstanceInfo::from)
            .collect();
        assert_eq!(instances[0], InstanceInfo {
            id: "i-0abc".into(),
            name: Some("sbc-edge-1".into()),
            state: Some("running".into()),
            private_ip: Some("10.1.0.9".into()),
        });
        assert_eq!(instances[1].name, None);
        assert_eq!(instances[1].private_ip, None);
    }

    #[test]
    fn test_parse_cluster_list() {
        let res: ListClustersResponse = serde_json::from_str(r#"{ "clusterArns": [
            "arn:aws:ecs:us-east-1:123:cluster/sbc-prod",
            "arn:aws:ecs:us-east-1:123:cluster/media"
        ]}"#).unwrap();
        let names: Vec<&str> = res.cluster_arns.iter().map(|a| arn_name(a)).collect();
        assert_eq!(names, vec!["sbc-prod", "media"]);
    }
}
