// @generated by hubspoke. Do not edit by hand.
// conversion set: <fingerprint>

/// Fingerprint of the conversion set this file was generated from
pub const CONVERSION_SET_FINGERPRINT: &str = "<fingerprint>";

/// site.example.io/v1 Site (hub)
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteV1Converter;

impl hubspoke::Converter for SiteV1Converter {
    type Hub = hubspoke::VersionedEnvelope<crate::site::v1::SiteSpec>;
    type Spoke = hubspoke::VersionedEnvelope<crate::site::v1::SiteSpec>;

    fn convert_to(&self, spoke: Self::Spoke) -> hubspoke::Result<Self::Hub> {
        let spec = spoke.spec;
        Ok(hubspoke::VersionedEnvelope {
            api_version: "site.example.io/v1".to_string(),
            kind: "Site".to_string(),
            metadata: spoke.metadata,
            spec: crate::site::v1::SiteSpec {
                owner: spec.owner,
                address: spec.address,
                contacts: spec.contacts,
            },
            status: None,
        })
    }

    fn convert_from(&self, hub: Self::Hub) -> hubspoke::Result<Self::Spoke> {
        let spec = hub.spec;
        Ok(hubspoke::VersionedEnvelope {
            api_version: "site.example.io/v1".to_string(),
            kind: "Site".to_string(),
            metadata: hub.metadata,
            spec: crate::site::v1::SiteSpec {
                owner: spec.owner,
                address: spec.address,
                contacts: spec.contacts,
            },
            status: None,
        })
    }
}

/// site.example.io/v1alpha1 Site <-> site.example.io/v1 (hub)
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteV1alpha1Converter;

impl hubspoke::Converter for SiteV1alpha1Converter {
    type Hub = hubspoke::VersionedEnvelope<crate::site::v1::SiteSpec>;
    type Spoke = hubspoke::VersionedEnvelope<crate::site::v1alpha1::SiteSpec>;

    fn convert_to(&self, spoke: Self::Spoke) -> hubspoke::Result<Self::Hub> {
        let spec = spoke.spec;
        Ok(hubspoke::VersionedEnvelope {
            api_version: "site.example.io/v1".to_string(),
            kind: "Site".to_string(),
            metadata: spoke.metadata,
            spec: crate::site::v1::SiteSpec {
                owner: spec.owner.unwrap_or_default(),
                address: Self::to_hub_address(spec.address)?,
                contacts: spec.contacts.into_iter().map(Self::to_hub_contact).collect::<hubspoke::Result<_>>()?,
            },
            status: None,
        })
    }

    fn convert_from(&self, hub: Self::Hub) -> hubspoke::Result<Self::Spoke> {
        let spec = hub.spec;
        Ok(hubspoke::VersionedEnvelope {
            api_version: "site.example.io/v1alpha1".to_string(),
            kind: "Site".to_string(),
            metadata: hub.metadata,
            spec: crate::site::v1alpha1::SiteSpec {
                owner: Some(spec.owner),
                address: Self::from_hub_address(spec.address)?,
                contacts: spec.contacts.into_iter().map(Self::from_hub_contact).collect::<hubspoke::Result<_>>()?,
            },
            status: None,
        })
    }
}

impl SiteV1alpha1Converter {
    fn to_hub_address(value: crate::site::v1alpha1::Address) -> hubspoke::Result<crate::site::v1::Address> {
        Ok(crate::site::v1::Address {
            street: value.street,
            city: value.city.unwrap_or_default(),
            ..Default::default()
        })
    }

    fn to_hub_contact(value: crate::site::v1alpha1::Contact) -> hubspoke::Result<crate::site::v1::Contact> {
        Ok(crate::site::v1::Contact {
            name: value.name,
            ..Default::default()
        })
    }

    fn from_hub_address(value: crate::site::v1::Address) -> hubspoke::Result<crate::site::v1alpha1::Address> {
        Ok(crate::site::v1alpha1::Address {
            street: value.street,
            city: Some(value.city),
        })
    }

    fn from_hub_contact(value: crate::site::v1::Contact) -> hubspoke::Result<crate::site::v1alpha1::Contact> {
        Ok(crate::site::v1alpha1::Contact {
            name: value.name,
            ..Default::default()
        })
    }
}
