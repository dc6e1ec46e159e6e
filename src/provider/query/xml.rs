//! EC2 Query API XML documents
//!
//! Only the fields discovery reads are extracted. Lookups go through direct
//! children: an instance's network interfaces carry their own
//! `privateIpAddress` elements further down the tree.

use roxmltree::{Document, Node};

use crate::provider::model::{DescribeInstancesResponse, Instance, Reservation, Tag};
use crate::provider::{ProviderError, ProviderResult};

/// The `<Error>` element of an EC2 error response
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApiError {
    pub code: String,
    pub message: String,
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name).map(|n| n.text().unwrap_or_default().trim().to_string())
}

/// `<item>` children of the named set element
fn items<'a, 'input>(node: Node<'a, 'input>, set: &str) -> Vec<Node<'a, 'input>> {
    child(node, set)
        .map(|s| {
            s.children()
                .filter(|n| n.is_element() && n.tag_name().name() == "item")
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_describe_instances(body: &str) -> ProviderResult<DescribeInstancesResponse> {
    let doc = Document::parse(body)
        .map_err(|e| ProviderError::Malformed(format!("invalid XML: {}", e)))?;
    let root = doc.root_element();
    if root.tag_name().name() != "DescribeInstancesResponse" {
        return Err(ProviderError::Malformed(format!(
            "unexpected root element <{}>",
            root.tag_name().name()
        )));
    }

    let reservations = items(root, "reservationSet")
        .into_iter()
        .map(parse_reservation)
        .collect::<ProviderResult<Vec<_>>>()?;
    Ok(DescribeInstancesResponse { reservations })
}

fn parse_reservation(node: Node<'_, '_>) -> ProviderResult<Reservation> {
    let instances = items(node, "instancesSet")
        .into_iter()
        .map(parse_instance)
        .collect::<ProviderResult<Vec<_>>>()?;
    Ok(Reservation {
        reservation_id: child_text(node, "reservationId"),
        instances,
    })
}

fn parse_instance(node: Node<'_, '_>) -> ProviderResult<Instance> {
    let instance_id = child_text(node, "instanceId")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::Malformed("instance without instanceId".to_string()))?;

    let tags = items(node, "tagSet")
        .into_iter()
        .map(|item| {
            Tag::new(
                child_text(item, "key").unwrap_or_default(),
                child_text(item, "value").unwrap_or_default(),
            )
        })
        .collect();

    Ok(Instance {
        instance_id,
        private_ip_address: child_text(node, "privateIpAddress").filter(|ip| !ip.is_empty()),
        tags,
    })
}

/// Extract code and message from an error body, if it is one
pub(crate) fn parse_error(body: &str) -> Option<ApiError> {
    let doc = Document::parse(body).ok()?;
    let error = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "Error")?;
    Some(ApiError {
        code: child_text(error, "Code")?,
        message: child_text(error, "Message").unwrap_or_default(),
    })
}
