use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const RSM_NS: &str = "urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100";
pub const RAM_NS: &str =
    "urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100";
pub const UDT_NS: &str = "urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100";
pub const QDT_NS: &str = "urn:un:unece:uncefact:data:standard:QualifiedDataType:100";

pub const MINIMUM_DIR: &str = "zugferd23de/Schema/0. Factur-X_1.07.2_MINIMUM";
pub const UBL_DIR: &str = "xRechnung/XRechnung 3.0.1/validator-configuration-xrechnung_3.0.1_2023-09-22/resources/ubl/2.1/xsd";

const MINIMUM_ROOT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:rsm="urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100"
           xmlns:ram="urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100"
           targetNamespace="urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100"
           elementFormDefault="qualified">
  <xs:import namespace="urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100"
             schemaLocation="Factur-X_1.07.2_MINIMUM_urn_un_unece_uncefact_data_standard_ReusableAggregateBusinessInformationEntity_100.xsd"/>
  <xs:element name="CrossIndustryInvoice" type="rsm:CrossIndustryInvoiceType"/>
  <xs:complexType name="CrossIndustryInvoiceType">
    <xs:sequence>
      <xs:element name="ExchangedDocumentContext" type="ram:ExchangedDocumentContextType"/>
      <xs:element name="ExchangedDocument" type="ram:ExchangedDocumentType"/>
      <xs:element name="SupplyChainTradeTransaction" type="ram:SupplyChainTradeTransactionType"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>
"#;

const MINIMUM_RAM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:ram="urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100"
           xmlns:qdt="urn:un:unece:uncefact:data:standard:QualifiedDataType:100"
           xmlns:udt="urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100"
           targetNamespace="urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100"
           elementFormDefault="qualified">
  <xs:import namespace="urn:un:unece:uncefact:data:standard:QualifiedDataType:100"
             schemaLocation="Factur-X_1.07.2_MINIMUM_urn_un_unece_uncefact_data_standard_QualifiedDataType_100.xsd"/>
  <xs:import namespace="urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100"
             schemaLocation="Factur-X_1.07.2_MINIMUM_urn_un_unece_uncefact_data_standard_UnqualifiedDataType_100.xsd"/>
  <xs:complexType name="DocumentContextParameterType">
    <xs:sequence>
      <xs:element name="ID" type="udt:IDType"/>
    </xs:sequence>
  </xs:complexType>
  <xs:complexType name="ExchangedDocumentContextType">
    <xs:sequence>
      <xs:element name="BusinessProcessSpecifiedDocumentContextParameter" type="ram:DocumentContextParameterType" minOccurs="0"/>
      <xs:element name="GuidelineSpecifiedDocumentContextParameter" type="ram:DocumentContextParameterType"/>
    </xs:sequence>
  </xs:complexType>
  <xs:complexType name="ExchangedDocumentType">
    <xs:sequence>
      <xs:element name="ID" type="udt:IDType"/>
      <xs:element name="TypeCode" type="qdt:DocumentCodeType"/>
      <xs:element name="IssueDateTime" type="udt:DateTimeType"/>
    </xs:sequence>
  </xs:complexType>
  <xs:complexType name="SupplyChainTradeTransactionType">
    <xs:sequence>
      <xs:element name="ApplicableHeaderTradeSettlement" type="ram:HeaderTradeSettlementType"/>
    </xs:sequence>
  </xs:complexType>
  <xs:complexType name="HeaderTradeSettlementType">
    <xs:sequence>
      <xs:element name="InvoiceCurrencyCode" type="qdt:CurrencyCodeType"/>
      <xs:element name="SpecifiedTradeSettlementHeaderMonetarySummation" type="ram:TradeSettlementHeaderMonetarySummationType"/>
    </xs:sequence>
  </xs:complexType>
  <xs:complexType name="TradeSettlementHeaderMonetarySummationType">
    <xs:sequence>
      <xs:element name="TaxBasisTotalAmount" type="udt:AmountType"/>
      <xs:element name="DuePayableAmount" type="udt:AmountType"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>
"#;

const MINIMUM_UDT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:udt="urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100"
           targetNamespace="urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100"
           elementFormDefault="qualified">
  <xs:complexType name="IDType">
    <xs:simpleContent>
      <xs:extension base="xs:token">
        <xs:attribute name="schemeID" type="xs:token"/>
      </xs:extension>
    </xs:simpleContent>
  </xs:complexType>
  <xs:complexType name="AmountType">
    <xs:simpleContent>
      <xs:extension base="xs:decimal">
        <xs:attribute name="currencyID" type="xs:token"/>
      </xs:extension>
    </xs:simpleContent>
  </xs:complexType>
  <xs:complexType name="DateTimeType">
    <xs:choice>
      <xs:element name="DateTimeString">
        <xs:complexType>
          <xs:simpleContent>
            <xs:extension base="xs:string">
              <xs:attribute name="format" type="xs:string" use="required"/>
            </xs:extension>
          </xs:simpleContent>
        </xs:complexType>
      </xs:element>
    </xs:choice>
  </xs:complexType>
</xs:schema>
"#;

const MINIMUM_QDT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:qdt="urn:un:unece:uncefact:data:standard:QualifiedDataType:100"
           targetNamespace="urn:un:unece:uncefact:data:standard:QualifiedDataType:100"
           elementFormDefault="qualified">
  <xs:simpleType name="DocumentCodeContentType">
    <xs:restriction base="xs:token">
      <xs:enumeration value="380"/>
      <xs:enumeration value="381"/>
      <xs:enumeration value="384"/>
      <xs:enumeration value="389"/>
      <xs:enumeration value="751"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:complexType name="DocumentCodeType">
    <xs:simpleContent>
      <xs:extension base="qdt:DocumentCodeContentType"/>
    </xs:simpleContent>
  </xs:complexType>
  <xs:simpleType name="CurrencyCodeContentType">
    <xs:restriction base="xs:token">
      <xs:pattern value="[A-Z]{3}"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:complexType name="CurrencyCodeType">
    <xs:simpleContent>
      <xs:extension base="qdt:CurrencyCodeContentType"/>
    </xs:simpleContent>
  </xs:complexType>
</xs:schema>
"#;

const UBL_CBC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
            xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2"
            targetNamespace="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2"
            elementFormDefault="qualified">
  <xsd:element name="ID" type="xsd:normalizedString"/>
  <xsd:element name="IssueDate" type="xsd:date"/>
  <xsd:element name="PayableAmount">
    <xsd:complexType>
      <xsd:simpleContent>
        <xsd:extension base="xsd:decimal">
          <xsd:attribute name="currencyID" type="xsd:token" use="required"/>
        </xsd:extension>
      </xsd:simpleContent>
    </xsd:complexType>
  </xsd:element>
</xsd:schema>
"#;

fn ubl_maindoc(name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema"
            xmlns="urn:oasis:names:specification:ubl:schema:xsd:{name}-2"
            xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2"
            targetNamespace="urn:oasis:names:specification:ubl:schema:xsd:{name}-2"
            elementFormDefault="qualified">
  <xsd:import namespace="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2"
              schemaLocation="../common/UBL-CommonBasicComponents-2.1.xsd"/>
  <xsd:element name="{name}" type="{name}Type"/>
  <xsd:complexType name="{name}Type">
    <xsd:sequence>
      <xsd:element ref="cbc:ID"/>
      <xsd:element ref="cbc:IssueDate"/>
      <xsd:element ref="cbc:PayableAmount"/>
    </xsd:sequence>
  </xsd:complexType>
</xsd:schema>
"#
    )
}

/// The UBL 2.1 xmldsig schema ships with a DOCTYPE naming the W3C
/// XMLSchema DTD plus an internal subset.
pub const LEGACY_XMLDSIG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE schema
  PUBLIC "-//W3C//DTD XMLSchema 200102//EN" "http://www.w3.org/2001/XMLSchema.dtd"
 [
   <!ATTLIST schema
     xmlns:ds CDATA #FIXED "http://www.w3.org/2000/09/xmldsig#">
   <!ENTITY dsig 'http://www.w3.org/2000/09/xmldsig#'>
   <!ENTITY % p ''>
   <!ENTITY % s ''>
  ]>
<schema xmlns="http://www.w3.org/2001/XMLSchema"
        xmlns:ds="http://www.w3.org/2000/09/xmldsig#"
        targetNamespace="http://www.w3.org/2000/09/xmldsig#"
        version="0.1" elementFormDefault="qualified">
  <simpleType name="DigestValueType">
    <restriction base="base64Binary"/>
  </simpleType>
  <element name="DigestValue" type="ds:DigestValueType"/>
</schema>
"#;

/// A file at the legacy path that the hardened reader cannot turn into a
/// schema.
pub const LEGACY_NOT_A_SCHEMA: &str = r#"<?xml version="1.0"?>
<!DOCTYPE signature SYSTEM "xmldsig-core.dtd">
<signature/>
"#;

/// A documentation tree laid out like the real one, with only the parts
/// the tests need.
pub struct DocumentationTree {
    pub temp: TempDir,
}

impl DocumentationTree {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn minimum_dir(&self) -> PathBuf {
        self.root().join(MINIMUM_DIR)
    }

    pub fn ubl_dir(&self) -> PathBuf {
        self.root().join(UBL_DIR)
    }

    /// Factur-X MINIMUM: a root schema importing three component schemas.
    pub fn with_minimum(self) -> Self {
        let dir = self.minimum_dir();
        write(&dir.join("Factur-X_1.07.2_MINIMUM.xsd"), MINIMUM_ROOT);
        write(
            &dir.join("Factur-X_1.07.2_MINIMUM_urn_un_unece_uncefact_data_standard_ReusableAggregateBusinessInformationEntity_100.xsd"),
            MINIMUM_RAM,
        );
        write(
            &dir.join("Factur-X_1.07.2_MINIMUM_urn_un_unece_uncefact_data_standard_UnqualifiedDataType_100.xsd"),
            MINIMUM_UDT,
        );
        write(
            &dir.join("Factur-X_1.07.2_MINIMUM_urn_un_unece_uncefact_data_standard_QualifiedDataType_100.xsd"),
            MINIMUM_QDT,
        );
        self
    }

    /// UBL 2.1 maindoc and common schemas with the given xmldsig content.
    pub fn with_ubl(self, xmldsig: &str) -> Self {
        let dir = self.ubl_dir();
        write(&dir.join("maindoc/UBL-Invoice-2.1.xsd"), &ubl_maindoc("Invoice"));
        write(&dir.join("maindoc/UBL-CreditNote-2.1.xsd"), &ubl_maindoc("CreditNote"));
        write(&dir.join("common/UBL-CommonBasicComponents-2.1.xsd"), UBL_CBC);
        write(&dir.join("common/UBL-xmldsig-core-schema-2.1.xsd"), xmldsig);
        self
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    fs::write(path, content).expect("write fixture");
}

/// A Factur-X MINIMUM invoice. The document type code sits on line 10.
pub fn minimum_invoice(type_code: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rsm:CrossIndustryInvoice xmlns:rsm="{RSM_NS}" xmlns:ram="{RAM_NS}" xmlns:udt="{UDT_NS}" xmlns:qdt="{QDT_NS}">
  <rsm:ExchangedDocumentContext>
    <ram:GuidelineSpecifiedDocumentContextParameter>
      <ram:ID>urn:factur-x.eu:1p0:minimum</ram:ID>
    </ram:GuidelineSpecifiedDocumentContextParameter>
  </rsm:ExchangedDocumentContext>
  <rsm:ExchangedDocument>
    <ram:ID>471102</ram:ID>
    <ram:TypeCode>{type_code}</ram:TypeCode>
    <ram:IssueDateTime>
      <udt:DateTimeString format="102">20241115</udt:DateTimeString>
    </ram:IssueDateTime>
  </rsm:ExchangedDocument>
  <rsm:SupplyChainTradeTransaction>
    <ram:ApplicableHeaderTradeSettlement>
      <ram:InvoiceCurrencyCode>EUR</ram:InvoiceCurrencyCode>
      <ram:SpecifiedTradeSettlementHeaderMonetarySummation>
        <ram:TaxBasisTotalAmount>198.00</ram:TaxBasisTotalAmount>
        <ram:DuePayableAmount>235.62</ram:DuePayableAmount>
      </ram:SpecifiedTradeSettlementHeaderMonetarySummation>
    </ram:ApplicableHeaderTradeSettlement>
  </rsm:SupplyChainTradeTransaction>
</rsm:CrossIndustryInvoice>
"#
    )
}

pub const MINIMUM_TYPE_CODE_LINE: u32 = 10;

/// A UBL invoice or credit note with the given payable amount.
pub fn ubl_document(name: &str, amount: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<{name} xmlns="urn:oasis:names:specification:ubl:schema:xsd:{name}-2"
        xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2">
  <cbc:ID>RE-2024-001</cbc:ID>
  <cbc:IssueDate>2024-11-15</cbc:IssueDate>
  <cbc:PayableAmount currencyID="EUR">{amount}</cbc:PayableAmount>
</{name}>
"#
    )
}

pub const UBL_AMOUNT_LINE: u32 = 6;
